//! Routing of overpayments to a client's running credit.
//!
//! A receipt that pays more than is owed is rejected unless the caller asks
//! for the excess to be credited to one of the receipt's clients. The router
//! only describes the credit; granting it is up to the credit ledger.

use serde::{Deserialize, Serialize};

use crate::{ClientId, EngineError, MoneyMap, ResultEngine};

/// Caller's consent to route an excess payment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverpaymentRequest {
    #[serde(default)]
    pub allow_excess: bool,
    #[serde(default)]
    pub beneficiary_client_id: Option<ClientId>,
}

impl OverpaymentRequest {
    #[must_use]
    pub fn credit_to(client_id: ClientId) -> Self {
        Self {
            allow_excess: true,
            beneficiary_client_id: Some(client_id),
        }
    }
}

/// Excess to credit to a client, per currency, in absolute values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCreditExcessDescriptor {
    pub client_id: ClientId,
    pub by_currency: MoneyMap,
}

/// Inspects the post-receipt balance and decides what to do with any excess.
///
/// - nothing overpaid: `Ok(None)`
/// - overpaid with consent and a beneficiary among `attached_clients`:
///   `Ok(Some(descriptor))`
/// - overpaid otherwise: [`EngineError::Overpayment`]
pub fn route_overpayment(
    debt_after: &MoneyMap,
    request: &OverpaymentRequest,
    attached_clients: &[ClientId],
) -> ResultEngine<Option<ClientCreditExcessDescriptor>> {
    let excess = debt_after.excess();
    if excess.is_empty() {
        return Ok(None);
    }

    if !request.allow_excess {
        return Err(EngineError::Overpayment(format!(
            "receipt exceeds the debt by {excess}"
        )));
    }
    let Some(client_id) = request.beneficiary_client_id else {
        return Err(EngineError::Overpayment(format!(
            "receipt exceeds the debt by {excess} and no client was chosen for the credit"
        )));
    };
    if !attached_clients.contains(&client_id) {
        return Err(EngineError::Overpayment(format!(
            "client {client_id} is not attached to the receipt"
        )));
    }

    tracing::warn!(client_id, %excess, "overpayment routed to client credit");

    Ok(Some(ClientCreditExcessDescriptor {
        client_id,
        by_currency: excess,
    }))
}
