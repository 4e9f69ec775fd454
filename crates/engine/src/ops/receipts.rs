use crate::{CounterKey, ResultEngine, counters::AgencyId};

use super::Engine;

impl Engine {
    /// Human-facing number for a new receipt of `agency_id`.
    pub async fn issue_receipt_number(&self, agency_id: AgencyId) -> ResultEngine<i64> {
        self.next_counter(agency_id, CounterKey::Receipt.as_str())
            .await
    }
}
