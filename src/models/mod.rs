//! Data models for the loan desk

pub mod copy;
pub mod loan;
pub mod report;

use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use copy::{BookCopy, CopyStatus, TitleAvailability, TitleRef};
pub use loan::{ActiveLoan, Loan, LoanStatus, NewLoan, OpenLoan};
pub use report::{LoanSummary, MonthlyActivity, TitleLoanCount};

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash,
            Serialize, Deserialize, sqlx::Type, utoipa::ToSchema,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(
    /// Catalog title (book) identifier, owned by the catalog
    TitleId
);
id_newtype!(
    /// Physical copy identifier
    CopyId
);
id_newtype!(
    /// Loan identifier, assigned in strictly increasing order
    LoanId
);
id_newtype!(
    /// Library member identifier
    MemberId
);
