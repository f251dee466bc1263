use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;

use settle_orders::{CollaboratorError, FiscalIdentifiers, FiscalService, Order};

use super::FailureBudget;

/// Issues electronic-invoice identifiers from a local sequence.
///
/// `consecutivo` is branch (3) + terminal (5) + document type `01` + a
/// 10-digit sequence. `clave` is country `506` + `DDMMYY` + the 12-digit
/// issuer id + `consecutivo` + situation `1` + an 8-digit security code,
/// 50 digits in all. No signing or transmission happens here.
#[derive(Debug)]
pub struct SequentialFiscalService {
    issuer_id: String,
    branch_code: u16,
    terminal: u32,
    next: AtomicU64,
    failures: FailureBudget,
    rejecting: AtomicBool,
}

impl SequentialFiscalService {
    pub fn new(issuer_id: u64) -> Self {
        Self {
            issuer_id: format!("{:012}", issuer_id % 1_000_000_000_000),
            branch_code: 1,
            terminal: 1,
            next: AtomicU64::new(1),
            failures: FailureBudget::default(),
            rejecting: AtomicBool::new(false),
        }
    }

    /// Make the next `calls` requests fail as unavailable.
    pub fn fail_next(&self, calls: u32) {
        self.failures.set(calls);
    }

    /// Refuse every request permanently (until switched back).
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Identifiers issued so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::SeqCst) - 1
    }
}

impl Default for SequentialFiscalService {
    fn default() -> Self {
        Self::new(3_101_234_567)
    }
}

impl FiscalService for SequentialFiscalService {
    fn assign_invoice_identifiers(&self, order: &Order) -> Result<FiscalIdentifiers, CollaboratorError> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Rejected(format!(
                "fiscal service refused order {}",
                order.order_number()
            )));
        }
        self.failures.take("fiscal service")?;

        let sequence = self.next.fetch_add(1, Ordering::SeqCst) % 10_000_000_000;
        let consecutivo = format!(
            "{:03}{:05}01{:010}",
            self.branch_code, self.terminal, sequence
        );
        let issued_on = order.completed_at().unwrap_or_else(Utc::now);
        let security = order.id_typed().0.as_uuid().as_u128() % 100_000_000;
        let clave = format!(
            "506{}{}{}1{:08}",
            issued_on.format("%d%m%y"),
            self.issuer_id,
            consecutivo,
            security
        );

        Ok(FiscalIdentifiers { clave, consecutivo })
    }
}
