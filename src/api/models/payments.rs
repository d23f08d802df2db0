use crate::config::CreditPackage;
use crate::db::models::payments::{PaymentDBResponse, PaymentStatus};
use crate::types::{PaymentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

// Request models

/// Request a hosted-checkout URL for a configured package
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutCreate {
    /// Package name, as listed by `GET /payments/packages`
    pub package: String,
}

// Response models

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    /// The provider's hosted-checkout URL to navigate to
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    /// Payment record ID
    #[schema(value_type = String, format = "uuid")]
    pub id: PaymentId,
    /// User ID
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub external_order_id: String,
    pub package_name: String,
    pub credits_amount: i64,
    pub amount_paid_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// A purchasable package, as configured
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PackageResponse {
    pub name: String,
    pub credits: i64,
    pub price_cents: i64,
}

/// Query parameters for listing payments
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListPaymentsQuery {
    /// Number of items to skip
    #[param(default = 0, minimum = 0)]
    pub skip: Option<i64>,

    /// Maximum number of items to return
    #[param(default = 100, minimum = 1, maximum = 1000)]
    pub limit: Option<i64>,
}

// Conversions

impl From<PaymentDBResponse> for PaymentResponse {
    fn from(db: PaymentDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            external_order_id: db.external_order_id,
            package_name: db.package_name,
            credits_amount: db.credits_amount,
            amount_paid_cents: db.amount_paid_cents,
            currency: db.currency,
            status: db.status,
            created_at: db.created_at,
        }
    }
}

impl From<&CreditPackage> for PackageResponse {
    fn from(package: &CreditPackage) -> Self {
        Self {
            name: package.name.clone(),
            credits: package.credits,
            price_cents: package.price_cents,
        }
    }
}
