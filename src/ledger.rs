// 10.0: the authoritative store. exclusively owns every Loan and LoanParams
// record plus the per-pool interest aggregates. loan ids are freshly generated;
// params ids are content-addressed and registration is idempotent.

use crate::interest::LenderInterestData;
use crate::loan::{Loan, LoanParams};
use crate::types::{LoanId, LoanParamsId, PoolId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoanLedger {
    loans: HashMap<LoanId, Loan>,
    params: HashMap<LoanParamsId, LoanParams>,
    interest: HashMap<PoolId, LenderInterestData>,
    next_loan_id: u64,
}

impl LoanLedger {
    pub fn new() -> Self {
        Self {
            loans: HashMap::new(),
            params: HashMap::new(),
            interest: HashMap::new(),
            next_loan_id: 1,
        }
    }

    pub fn next_loan_id(&mut self) -> LoanId {
        let id = LoanId(self.next_loan_id);
        self.next_loan_id += 1;
        id
    }

    // params are never physically removed; live loans must keep resolving them
    pub fn register_params(&mut self, params: LoanParams) -> LoanParamsId {
        let id = params.id;
        self.params.entry(id).or_insert(params);
        id
    }

    pub fn get_params(&self, id: LoanParamsId) -> Option<&LoanParams> {
        self.params.get(&id)
    }

    pub fn get_params_mut(&mut self, id: LoanParamsId) -> Option<&mut LoanParams> {
        self.params.get_mut(&id)
    }

    pub fn insert_loan(&mut self, loan: Loan) {
        self.loans.insert(loan.id, loan);
    }

    pub fn get_loan(&self, id: LoanId) -> Option<&Loan> {
        self.loans.get(&id)
    }

    pub fn get_loan_mut(&mut self, id: LoanId) -> Option<&mut Loan> {
        self.loans.get_mut(&id)
    }

    pub fn loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.values()
    }

    pub fn active_loans_for_pool(&self, pool: PoolId) -> impl Iterator<Item = &Loan> {
        self.loans
            .values()
            .filter(move |loan| loan.active && loan.pool == pool)
    }

    pub fn interest_data(&self, pool: PoolId) -> Option<&LenderInterestData> {
        self.interest.get(&pool)
    }

    pub fn interest_data_mut(&mut self, pool: PoolId) -> Option<&mut LenderInterestData> {
        self.interest.get_mut(&pool)
    }

    pub fn init_interest_data(&mut self, pool: PoolId, data: LenderInterestData) {
        self.interest.entry(pool).or_insert(data);
    }

    /// Overwrite, unlike init. Used for checkpoint restores.
    pub fn set_interest_data(&mut self, pool: PoolId, data: LenderInterestData) {
        self.interest.insert(pool, data);
    }
}
