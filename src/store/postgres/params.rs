//! Binding `sea_query` values as `may_postgres` parameters.

use crate::error::GatewayError;
use may_postgres::types::ToSql;
use sea_query::{Value, Values};

/// Convert built query values into owned parameters and run `f` with them
///
/// Only the value kinds the depot tables use are supported. SQL NULLs keep
/// their column type so the server can infer parameter types.
pub fn with_params<F, R>(values: &Values, f: F) -> Result<R, GatewayError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, GatewayError>,
{
    let mut owned: Vec<Box<dyn ToSql>> = Vec::with_capacity(values.iter().count());
    for value in values.iter() {
        owned.push(to_param(value)?);
    }
    let params: Vec<&dyn ToSql> = owned.iter().map(|p| p.as_ref()).collect();
    f(&params)
}

fn to_param(value: &Value) -> Result<Box<dyn ToSql>, GatewayError> {
    let param: Box<dyn ToSql> = match value {
        Value::Bool(v) => Box::new(*v),
        Value::TinyInt(v) => Box::new(v.map(i32::from)),
        Value::SmallInt(v) => Box::new(v.map(i32::from)),
        Value::Int(v) => Box::new(*v),
        Value::BigInt(v) => Box::new(*v),
        Value::Unsigned(v) => Box::new(v.map(i64::from)),
        Value::BigUnsigned(Some(u)) => {
            let signed = i64::try_from(*u).map_err(|_| {
                GatewayError::Store(format!("value {u} does not fit a BIGINT column"))
            })?;
            Box::new(Some(signed))
        }
        Value::BigUnsigned(None) => Box::new(None::<i64>),
        Value::Double(v) => Box::new(*v),
        Value::String(Some(s)) => Box::new(Some(s.to_string())),
        Value::String(None) => Box::new(None::<String>),
        other => {
            return Err(GatewayError::Store(format!(
                "Unsupported value type in query: {other:?}"
            )))
        }
    };
    Ok(param)
}
