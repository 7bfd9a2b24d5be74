//! Back-office operations. Each one starts at [`session::require_admin`].

use crate::model::{
    DepositDecision, KycDecision, KycRequest, KycStatus, NotificationKind, PendingDeposit, TxId,
    TxKind, TxStatus, Uid, User, UserRecord,
};
use crate::session::{self, Token};

use super::{Ledger, LedgerError, NotFound, Precondition, touch};

impl Ledger {
    /// Every account, credentials stripped.
    pub fn list_users(&self, token: &Token) -> Result<Vec<User>, LedgerError> {
        session::require_admin(&self.state, token)?;
        Ok(self.users().cloned().collect())
    }

    /// Accounts awaiting KYC review, joined with their document images.
    pub fn list_pending_kyc(&self, token: &Token) -> Result<Vec<KycRequest>, LedgerError> {
        session::require_admin(&self.state, token)?;
        let queue = self
            .users()
            .filter(|user| user.kyc_status == KycStatus::Pending)
            .map(|user| KycRequest {
                user: user.clone(),
                kyc_images: self
                    .state
                    .kyc_images
                    .get(&user.uid)
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect();
        Ok(queue)
    }

    pub fn set_kyc_status(
        &mut self,
        token: &Token,
        target: &Uid,
        decision: KycDecision,
    ) -> Result<User, LedgerError> {
        let result = self.apply_kyc_decision(token, target, decision);
        Self::log_result("kyc review", target, &result);
        result
    }

    /// Every pending deposit across all accounts, with its owner.
    pub fn list_pending_deposits(&self, token: &Token) -> Result<Vec<PendingDeposit>, LedgerError> {
        session::require_admin(&self.state, token)?;
        let pending = self
            .users()
            .flat_map(|user| {
                user.transactions
                    .iter()
                    .filter(|tx| tx.is_pending_deposit())
                    .map(move |tx| PendingDeposit {
                        user_email: user.email.clone(),
                        user_name: user.name.clone(),
                        user_id: user.uid.clone(),
                        transaction: tx.clone(),
                    })
            })
            .collect();
        Ok(pending)
    }

    pub fn set_deposit_status(
        &mut self,
        token: &Token,
        target: &Uid,
        tx_id: &TxId,
        decision: DepositDecision,
    ) -> Result<User, LedgerError> {
        let result = self.apply_deposit_decision(token, target, tx_id, decision);
        Self::log_result("deposit review", tx_id, &result);
        result
    }
}

impl Ledger {
    fn target_mut(&mut self, target: &Uid) -> Result<&mut UserRecord, LedgerError> {
        self.state
            .find_by_uid_mut(target)
            .ok_or_else(|| NotFound::TargetUser(target.clone()).into())
    }

    fn apply_kyc_decision(
        &mut self,
        token: &Token,
        target: &Uid,
        decision: KycDecision,
    ) -> Result<User, LedgerError> {
        session::require_admin(&self.state, token)?;
        self.target_mut(target)?;

        let notification = match decision {
            KycDecision::Verified => self.notification(
                NotificationKind::System,
                "KYC Approved",
                "Your identity has been successfully verified.",
            ),
            KycDecision::Rejected => self.notification(
                NotificationKind::System,
                "KYC Rejected",
                "Your KYC submission has been rejected. Please review your details and resubmit.",
            ),
        };

        let record = self.target_mut(target)?;
        record.user.kyc_status = decision.into();
        record.user.notifications.insert(0, notification);
        touch(&mut record.user);
        let user = record.redacted();

        self.persist();
        Ok(user)
    }

    /// Settle a pending deposit:
    /// - Find the deposit on the target account
    /// - Ensure it is still `Pending` (settlement applies once)
    /// - Check the balance movement on a copy before touching the account
    /// - Release the pending amount, crediting the balance only on approval
    /// - Notify the account owner
    fn apply_deposit_decision(
        &mut self,
        token: &Token,
        target: &Uid,
        tx_id: &TxId,
        decision: DepositDecision,
    ) -> Result<User, LedgerError> {
        session::require_admin(&self.state, token)?;

        let record = self.target_mut(target)?;
        let tx = record
            .user
            .transactions
            .iter()
            .find(|tx| &tx.id == tx_id && matches!(tx.kind, TxKind::Deposit { .. }))
            .ok_or_else(|| NotFound::Deposit(tx_id.clone()))?;
        if tx.status != TxStatus::Pending {
            return Err(Precondition::DepositSettled(tx_id.clone()).into());
        }
        let (amount, asset) = (tx.amount, tx.asset.clone());
        let mut portfolio = record.user.portfolio.clone();
        portfolio.settle_pending(amount, decision == DepositDecision::Completed)?;

        let status = TxStatus::from(decision);
        let message = match decision {
            DepositDecision::Completed => format!(
                "Your deposit of {amount:.2} {asset} has been approved and added to your balance."
            ),
            DepositDecision::Failed => format!(
                "Your deposit of {amount:.2} {asset} has been declined. Please contact support."
            ),
        };
        let notification = self.notification(
            NotificationKind::Transaction,
            format!("Deposit {status}"),
            message,
        );

        let record = self.target_mut(target)?;
        if let Some(tx) = record.user.transactions.iter_mut().find(|tx| &tx.id == tx_id) {
            tx.status = status;
        }
        record.user.portfolio = portfolio;
        record.user.notifications.insert(0, notification);
        touch(&mut record.user);
        let user = record.redacted();

        self.persist();
        Ok(user)
    }
}
