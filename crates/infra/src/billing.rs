//! Billing records guarded by the authorization core.
//!
//! Every record is owned by the user who created it; the ownership policy
//! compares that owner against the requesting user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billforge_auth::Resource;
use billforge_core::{require_non_blank, DomainError, DomainResult, Entity, RecordId, UserId};

/// A record type that can be stored in a record store and gated by resource type.
pub trait BillingRecord:
    Entity<Id = RecordId> + Resource<UserId> + Clone + Serialize + Send + Sync + 'static
{
    /// Resource type name used in permissions (`"<type>:<action>"`).
    const RESOURCE_TYPE: &'static str;

    fn owner_id(&self) -> UserId;
}

macro_rules! owned_record {
    ($t:ty, $resource_type:literal) => {
        impl Entity for $t {
            type Id = RecordId;

            fn id(&self) -> &RecordId {
                &self.id
            }
        }

        impl Resource<UserId> for $t {
            fn owner(&self) -> Option<&UserId> {
                Some(&self.owner_id)
            }
        }

        impl BillingRecord for $t {
            const RESOURCE_TYPE: &'static str = $resource_type;

            fn owner_id(&self) -> UserId {
                self.owner_id
            }
        }
    };
}

/// VAT rate in basis points (2000 = 20%).
pub type BasisPoints = u32;

/// `None` when the amount is too large to carry VAT in `i64` cents.
fn vat_of(amount_cents: i64, vat_rate: BasisPoints) -> Option<i64> {
    // Round half away from zero.
    let scaled = amount_cents.checked_mul(i64::from(vat_rate))?;
    Some(scaled.checked_add(scaled.signum() * 5_000)? / 10_000)
}

fn out_of_range() -> DomainError {
    DomainError::validation("amount out of range")
}

// ─────────────────────────────────────────────────────────────────────────────
// Products
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: RecordId,
    pub owner_id: UserId,
    pub name: String,
    pub unit_price_cents: i64,
    pub vat_rate: BasisPoints,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub unit_price_cents: i64,
    #[serde(default)]
    pub vat_rate: BasisPoints,
}

impl ProductInput {
    fn validate(self) -> DomainResult<(String, i64, BasisPoints)> {
        let name = require_non_blank("name", &self.name)?;
        if self.unit_price_cents < 0 {
            return Err(DomainError::validation("unit_price_cents must not be negative"));
        }
        if self.vat_rate > 10_000 {
            return Err(DomainError::validation("vat_rate must be at most 10000 basis points"));
        }
        Ok((name, self.unit_price_cents, self.vat_rate))
    }
}

impl Product {
    pub fn create(owner_id: UserId, input: ProductInput) -> DomainResult<Self> {
        let (name, unit_price_cents, vat_rate) = input.validate()?;
        Ok(Self {
            id: RecordId::new(),
            owner_id,
            name,
            unit_price_cents,
            vat_rate,
            created_at: Utc::now(),
        })
    }

    pub fn update(&mut self, input: ProductInput) -> DomainResult<()> {
        let (name, unit_price_cents, vat_rate) = input.validate()?;
        self.name = name;
        self.unit_price_cents = unit_price_cents;
        self.vat_rate = vat_rate;
        Ok(())
    }
}

owned_record!(Product, "product");

// ─────────────────────────────────────────────────────────────────────────────
// Clients
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    pub id: RecordId,
    pub owner_id: UserId,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientInput {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl ClientInput {
    fn validate(self) -> DomainResult<(String, Option<String>)> {
        let name = require_non_blank("name", &self.name)?;
        let email = self
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        if let Some(email) = &email {
            if !email.contains('@') {
                return Err(DomainError::validation("email is not a valid address"));
            }
        }
        Ok((name, email))
    }
}

impl Client {
    pub fn create(owner_id: UserId, input: ClientInput) -> DomainResult<Self> {
        let (name, email) = input.validate()?;
        Ok(Self {
            id: RecordId::new(),
            owner_id,
            name,
            email,
            created_at: Utc::now(),
        })
    }

    pub fn update(&mut self, input: ClientInput) -> DomainResult<()> {
        let (name, email) = input.validate()?;
        self.name = name;
        self.email = email;
        Ok(())
    }
}

owned_record!(Client, "client");

// ─────────────────────────────────────────────────────────────────────────────
// Invoices
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    #[serde(default)]
    pub vat_rate: BasisPoints,
}

impl InvoiceLine {
    /// `None` on overflow.
    pub fn total_ht_cents(&self) -> Option<i64> {
        self.unit_price_cents.checked_mul(i64::from(self.quantity))
    }

    pub fn total_vat_cents(&self) -> Option<i64> {
        vat_of(self.total_ht_cents()?, self.vat_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvoiceTotals {
    pub ht_cents: i64,
    pub vat_cents: i64,
    pub ttc_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    pub id: RecordId,
    pub owner_id: UserId,
    pub client_id: RecordId,
    pub status: InvoiceStatus,
    pub lines: Vec<InvoiceLine>,
    pub totals: InvoiceTotals,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceInput {
    pub client_id: RecordId,
    #[serde(default)]
    pub lines: Vec<InvoiceLine>,
}

fn validate_lines(lines: Vec<InvoiceLine>) -> DomainResult<Vec<InvoiceLine>> {
    lines
        .into_iter()
        .enumerate()
        .map(|(idx, mut line)| {
            line.description = require_non_blank(&format!("lines[{idx}].description"), &line.description)?;
            if line.quantity == 0 {
                return Err(DomainError::validation(format!("lines[{idx}].quantity must be positive")));
            }
            if line.unit_price_cents < 0 {
                return Err(DomainError::validation(format!(
                    "lines[{idx}].unit_price_cents must not be negative"
                )));
            }
            if line.vat_rate > 10_000 {
                return Err(DomainError::validation(format!(
                    "lines[{idx}].vat_rate must be at most 10000 basis points"
                )));
            }
            Ok(line)
        })
        .collect()
}

fn totals_of(lines: &[InvoiceLine]) -> DomainResult<InvoiceTotals> {
    let mut ht_cents: i64 = 0;
    let mut vat_cents: i64 = 0;
    for line in lines {
        let line_ht = line.total_ht_cents().ok_or_else(out_of_range)?;
        let line_vat = line.total_vat_cents().ok_or_else(out_of_range)?;
        ht_cents = ht_cents.checked_add(line_ht).ok_or_else(out_of_range)?;
        vat_cents = vat_cents.checked_add(line_vat).ok_or_else(out_of_range)?;
    }
    Ok(InvoiceTotals {
        ht_cents,
        vat_cents,
        ttc_cents: ht_cents.checked_add(vat_cents).ok_or_else(out_of_range)?,
    })
}

impl Invoice {
    pub fn create(owner_id: UserId, input: InvoiceInput) -> DomainResult<Self> {
        let lines = validate_lines(input.lines)?;
        let totals = totals_of(&lines)?;
        Ok(Self {
            id: RecordId::new(),
            owner_id,
            client_id: input.client_id,
            status: InvoiceStatus::Draft,
            totals,
            lines,
            created_at: Utc::now(),
            finalized_at: None,
        })
    }

    pub fn is_draft(&self) -> bool {
        self.status == InvoiceStatus::Draft
    }

    /// Only drafts can be edited.
    pub fn update(&mut self, input: InvoiceInput) -> DomainResult<()> {
        if !self.is_draft() {
            return Err(DomainError::validation("finalized invoices cannot be edited"));
        }
        let lines = validate_lines(input.lines)?;
        let totals = totals_of(&lines)?;
        self.client_id = input.client_id;
        self.totals = totals;
        self.lines = lines;
        Ok(())
    }

    pub fn finalize(&mut self) -> DomainResult<()> {
        if !self.is_draft() {
            return Err(DomainError::validation("invoice is already finalized"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("an invoice needs at least one line"));
        }
        self.status = InvoiceStatus::Final;
        self.finalized_at = Some(Utc::now());
        Ok(())
    }
}

owned_record!(Invoice, "invoice");

// ─────────────────────────────────────────────────────────────────────────────
// Company settings
// ─────────────────────────────────────────────────────────────────────────────

/// Issuer details printed on a user's invoices. One record per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanySettings {
    pub id: RecordId,
    pub owner_id: UserId,
    pub legal_name: String,
    pub vat_number: Option<String>,
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanySettingsInput {
    pub legal_name: String,
    #[serde(default)]
    pub vat_number: Option<String>,
    #[serde(default)]
    pub address: String,
}

impl CompanySettings {
    pub fn create(owner_id: UserId, input: CompanySettingsInput) -> DomainResult<Self> {
        let mut settings = Self {
            id: RecordId::new(),
            owner_id,
            legal_name: String::new(),
            vat_number: None,
            address: String::new(),
        };
        settings.update(input)?;
        Ok(settings)
    }

    pub fn update(&mut self, input: CompanySettingsInput) -> DomainResult<()> {
        self.legal_name = require_non_blank("legal_name", &input.legal_name)?;
        self.vat_number = input
            .vat_number
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        self.address = input.address.trim().to_string();
        Ok(())
    }
}

owned_record!(CompanySettings, "company");
