//! Demo accounts present in every store.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::Amount;
use crate::model::{
    ChatMessage, ChatRole, KycStatus, Notification, NotificationId, NotificationKind, Portfolio,
    Transaction, TxId, TxKind, TxStatus, Uid, User, UserRecord,
};

fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn completed_deposit(id: &str, asset: &str, amount: f64, on: DateTime<Utc>) -> Transaction {
    Transaction {
        id: TxId::from(id),
        asset: asset.to_string(),
        amount: Amount::from_float(amount),
        status: TxStatus::Completed,
        date: on,
        kind: TxKind::Deposit {
            network: None,
            transaction_proof: None,
        },
    }
}

fn notification(
    id: &str,
    kind: NotificationKind,
    title: &str,
    message: &str,
    days_ago: i64,
    read: bool,
    now: DateTime<Utc>,
) -> Notification {
    Notification {
        id: NotificationId::from(id),
        kind,
        title: title.to_string(),
        message: message.to_string(),
        date: now - Duration::days(days_ago),
        read,
    }
}

fn account(uid: &str, email: &str, name: &str, password: &str) -> UserRecord {
    UserRecord {
        user: User {
            uid: Uid::from(uid),
            email: email.to_string(),
            name: name.to_string(),
            kyc_status: KycStatus::Unverified,
            portfolio: Portfolio::default(),
            transactions: Vec::new(),
            notifications: Vec::new(),
            full_name: None,
            date_of_birth: None,
            country: None,
            address: None,
            photo_url: None,
            is_admin: false,
            chat_history: Vec::new(),
            version: 0,
        },
        password: password.to_string(),
    }
}

/// The seed accounts keyed by email. Notification dates are relative to `now`.
pub fn seed_users(now: DateTime<Utc>) -> BTreeMap<String, UserRecord> {
    let mut leng = account(
        "10221",
        "Lengmelina1996@yahoo.com",
        "Leng Melina",
        "123456",
    );
    leng.user.kyc_status = KycStatus::Verified;
    leng.user.portfolio.balance = Amount::from_float(5000.0);
    leng.user.transactions = vec![completed_deposit("tx-leng1", "USDT", 5000.0, date(2025, 7, 1))];

    let mut alex = account("UID-TESTUSER", "alex@test.com", "Alex Johnson", "password123");
    alex.user.portfolio = Portfolio {
        balance: Amount::from_float(50_000.0),
        pending_balance: Amount::ZERO,
        pl: Amount::from_float(1250.75),
        pl_percentage: 2.5,
    };
    alex.user.transactions = vec![completed_deposit("tx1", "USD", 50_000.0, date(2025, 6, 20))];
    alex.user.notifications = vec![
        notification(
            "notif1",
            NotificationKind::Transaction,
            "Deposit Successful",
            "Your deposit of 1.2 BTC has been confirmed.",
            1,
            false,
            now,
        ),
        notification(
            "notif2",
            NotificationKind::Security,
            "Password Changed",
            "Your password was changed successfully from a new device.",
            2,
            false,
            now,
        ),
        notification(
            "notif3",
            NotificationKind::System,
            "System Maintenance",
            "Scheduled maintenance will occur on Sunday at 2 AM UTC.",
            5,
            true,
            now,
        ),
    ];
    alex.user.chat_history = vec![
        ChatMessage::new(ChatRole::User, "Hi, can you help me?"),
        ChatMessage::new(
            ChatRole::Model,
            "Of course! I am the CryptoPulse AI assistant. How can I help you today?",
        ),
    ];

    let mut admin = account("UID-ADMIN", "admin@cryptopulse.com", "Admin", "admin");
    admin.user.is_admin = true;
    admin.user.kyc_status = KycStatus::Verified;

    [leng, alex, admin]
        .into_iter()
        .map(|record| (record.user.email.clone(), record))
        .collect()
}
