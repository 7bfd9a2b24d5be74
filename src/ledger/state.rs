use crate::Amount;
use crate::model::Portfolio;

use super::Precondition;

/// Balance movements. Callers record the matching transaction.
///
/// Each movement either applies in full or leaves the portfolio untouched;
/// an amount that would leave the representable range is rejected as
/// [`Precondition::InvalidAmount`].
impl Portfolio {
    pub fn credit(&mut self, amount: Amount) -> Result<(), Precondition> {
        self.balance = checked(self.balance.checked_add(amount), amount)?;
        Ok(())
    }

    pub fn debit(&mut self, amount: Amount) -> Result<(), Precondition> {
        self.balance = checked(self.balance.checked_sub(amount), amount)?;
        Ok(())
    }

    /// Funds announced by a deposit, not yet spendable.
    pub fn acknowledge_pending(&mut self, amount: Amount) -> Result<(), Precondition> {
        self.pending_balance = checked(self.pending_balance.checked_add(amount), amount)?;
        Ok(())
    }

    /// Release pending funds, moving them to the balance when approved.
    pub fn settle_pending(&mut self, amount: Amount, approved: bool) -> Result<(), Precondition> {
        let pending = checked(self.pending_balance.checked_sub(amount), amount)?;
        let balance = if approved {
            checked(self.balance.checked_add(amount), amount)?
        } else {
            self.balance
        };
        self.pending_balance = pending;
        self.balance = balance;
        Ok(())
    }
}

fn checked(result: Option<Amount>, amount: Amount) -> Result<Amount, Precondition> {
    result.ok_or(Precondition::InvalidAmount(amount))
}
