//! Canadian sales tax functions
//!
//! Postal codes are validated by shape (letter, digit, letter, optionally
//! followed by the local delivery unit) and resolved to a province through
//! the `postal_provinces` table. Rates come from the `tax_rates` table.

use async_trait::async_trait;
use bigdecimal::{BigDecimal, RoundingMode};
use lazy_static::lazy_static;
use regex::Regex;
use ruleflow_core::{
    CoreError, FieldType, FieldValue, Function, FunctionEnv, FunctionOutcome, FunctionRegistry, FunctionSignature,
    ParamRole,
};
use std::sync::Arc;

use super::{decimal_arg, text_arg};
use crate::reference_data::{POSTAL_PROVINCES_TABLE, TAX_RATES_TABLE};

lazy_static! {
    static ref POSTAL_CODE: Regex = Regex::new(r"^[A-Z][0-9][A-Z](\s?[0-9][A-Z][0-9])?$").unwrap();
}

const RATE_COLUMNS: [&str; 3] = ["gst", "hst", "pst"];

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.register(Arc::new(ExistsInPostalCode::new()));
    registry.register(Arc::new(ProvinceFromPostalCode::new()));
    registry.register(Arc::new(TaxRate::new()));
    registry.register_pure(
        FunctionSignature::new(
            "calculate_tax_amount",
            vec![ParamRole::Input, ParamRole::Input, ParamRole::InputOutput],
        )
        .returning(FieldType::Decimal)
        .describe("base amount times rate, rounded to cents"),
        calculate_tax_amount,
    );
}

/// Upper-cased postal code when it has a valid shape
fn normalize(code: &str) -> Option<String> {
    let code = code.trim().to_ascii_uppercase();
    POSTAL_CODE.is_match(&code).then_some(code)
}

async fn province_of(env: &FunctionEnv, code: &str) -> Result<Option<String>, CoreError> {
    let Some(code) = normalize(code) else {
        return Ok(None);
    };
    let prefix = &code[..1];
    Ok(env
        .lookups
        .value(POSTAL_PROVINCES_TABLE, prefix, "province")
        .await?
        .and_then(|v| v.as_str().map(str::to_string)))
}

/// `exists_in_postal_code(code, out)`
pub struct ExistsInPostalCode {
    signature: FunctionSignature,
}

impl ExistsInPostalCode {
    pub fn new() -> Self {
        Self {
            signature: FunctionSignature::new(
                "exists_in_postal_code",
                vec![ParamRole::Input, ParamRole::InputOutput],
            )
            .returning(FieldType::Boolean)
            .describe("whether a postal code is well formed and its prefix is registered"),
        }
    }
}

impl Default for ExistsInPostalCode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Function for ExistsInPostalCode {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    async fn call(&self, args: &[FieldValue], env: &FunctionEnv) -> Result<FunctionOutcome, CoreError> {
        let code = text_arg("exists_in_postal_code", args, 0)?;
        let exists = province_of(env, &code).await?.is_some();
        tracing::debug!(postal_code = %code, exists, "Postal code checked");
        Ok(FunctionOutcome::assign(1, exists))
    }
}

/// `get_province_from_postal_code(code, out)`
pub struct ProvinceFromPostalCode {
    signature: FunctionSignature,
}

impl ProvinceFromPostalCode {
    pub fn new() -> Self {
        Self {
            signature: FunctionSignature::new(
                "get_province_from_postal_code",
                vec![ParamRole::Input, ParamRole::InputOutput],
            )
            .returning(FieldType::String)
            .describe("province code of a postal code"),
        }
    }
}

impl Default for ProvinceFromPostalCode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Function for ProvinceFromPostalCode {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    async fn call(&self, args: &[FieldValue], env: &FunctionEnv) -> Result<FunctionOutcome, CoreError> {
        let code = text_arg("get_province_from_postal_code", args, 0)?;
        Ok(match province_of(env, &code).await? {
            Some(province) => FunctionOutcome::assign(1, province),
            None => FunctionOutcome::value(FieldValue::Null),
        })
    }
}

/// `get_tax_rate(province, kind, out)` where kind is `gst`, `hst`, `pst` or `total`
pub struct TaxRate {
    signature: FunctionSignature,
}

impl TaxRate {
    pub fn new() -> Self {
        Self {
            signature: FunctionSignature::new(
                "get_tax_rate",
                vec![ParamRole::Input, ParamRole::Input, ParamRole::InputOutput],
            )
            .returning(FieldType::Decimal)
            .describe("tax rate of a province; zero for unknown provinces"),
        }
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Function for TaxRate {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    async fn call(&self, args: &[FieldValue], env: &FunctionEnv) -> Result<FunctionOutcome, CoreError> {
        let province = text_arg("get_tax_rate", args, 0)?.trim().to_ascii_uppercase();
        let kind = text_arg("get_tax_rate", args, 1)?.trim().to_ascii_lowercase();
        let columns: Vec<&str> = match kind.as_str() {
            "total" => RATE_COLUMNS.to_vec(),
            other => match RATE_COLUMNS.iter().find(|column| **column == other) {
                Some(column) => vec![*column],
                None => {
                    return Err(CoreError::ValidationError(format!(
                        "get_tax_rate: unknown tax kind '{}'",
                        other
                    )))
                }
            },
        };

        let row = env.lookups.lookup(TAX_RATES_TABLE, &province).await?;
        let mut rate = BigDecimal::from(0);
        for column in columns {
            if let Some(value) = row.column(column) {
                if let Some(component) = FieldValue::from_json(value).as_decimal() {
                    rate += component;
                }
            }
        }
        if !row.is_found() {
            tracing::debug!(province = %province, "No tax rates for province");
        }
        Ok(FunctionOutcome::assign(2, rate))
    }
}

fn calculate_tax_amount(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let base = decimal_arg("calculate_tax_amount", args, 0)?;
    let rate = decimal_arg("calculate_tax_amount", args, 1)?;
    let amount = (base * rate).with_scale_round(2, RoundingMode::HalfUp);
    Ok(FunctionOutcome::assign(2, amount))
}
