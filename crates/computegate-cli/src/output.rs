//! Result rendering for stdout

use clap::ValueEnum;
use serde_json::{json, Value};

use computegate_chain::ChainBackend;
use computegate_meter::Authorization;
use computegate_types::{Identity, TokenAmount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

pub fn print_address(format: Format, backend: &dyn ChainBackend, signer: Option<&str>) {
    match format {
        Format::Text => {
            println!("chain:    {}", backend.family());
            println!("treasury: {}", backend.treasury());
            println!("signer:   {}", signer.unwrap_or("(none)"));
        }
        Format::Json => emit(json!({
            "chain": backend.family(),
            "treasury": backend.treasury(),
            "signer": signer,
        })),
    }
}

pub fn print_quote(format: Format, policy: &str, units: u64, amount: TokenAmount) {
    match format {
        Format::Text => println!("{units} units cost {amount} ({policy})"),
        Format::Json => emit(json!({
            "policy": policy,
            "units": units,
            "amount": amount,
        })),
    }
}

pub fn print_balance(format: Format, holder: &Identity, balance: TokenAmount) {
    match format {
        Format::Text => println!("{holder}: {balance}"),
        Format::Json => emit(json!({
            "holder": holder,
            "balance": balance,
        })),
    }
}

pub fn print_authorization(
    format: Format,
    holder: &Identity,
    units: u64,
    outcome: &Authorization,
) {
    match format {
        Format::Text => println!("{holder} x{units}: {outcome}"),
        Format::Json => emit(authorization_json(holder, units, outcome)),
    }
}

fn authorization_json(holder: &Identity, units: u64, outcome: &Authorization) -> Value {
    let mut body = json!({
        "holder": holder,
        "units": units,
        "decision": outcome.decision(),
        "required": outcome.required(),
    });
    match outcome {
        Authorization::Admitted { receipt } => {
            body["receipt"] = json!(receipt);
        }
        Authorization::Denied {
            balance, shortfall, ..
        } => {
            body["balance"] = json!(balance);
            body["shortfall"] = json!(shortfall);
        }
        Authorization::ChargeFailed { error, .. } => {
            body["error"] = json!({
                "code": error.error_code(),
                "message": error.to_string(),
                "transaction_id": error.transaction_id(),
                "retriable": error.is_retriable(),
            });
        }
    }
    body
}

fn emit(value: Value) {
    match serde_json::to_string_pretty(&value) {
        Ok(text) => println!("{text}"),
        Err(e) => tracing::error!(error = %e, "failed to render output"),
    }
}
