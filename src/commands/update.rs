use crate::args::UpdateArgs;
use crate::commands::{fields_from, Out};
use crate::container::EntityList;
use crate::model::Record;
use crate::Result;
use serde_json::Value;

/// Changes the record `args.id()`.
///
/// The record store replaces records as a whole, so the record is loaded and selected first and
/// the `--field` pairs are laid over its current fields. Fields that are not given keep their
/// values.
///
/// # Errors
///
/// - Returns an error if the record is not found in the current scope.
/// - Returns an error if the record store rejects the change.
pub async fn update(list: EntityList, args: UpdateArgs) -> Result<Out<Record>> {
    list.load().await?;
    let current = list.select(args.id()).await?;

    let mut fields = current.into_fields();
    fields.overlay(&fields_from(args.fields()));
    if let Some(scope) = list.scope() {
        // a record never leaves its partition
        fields.set(scope.field(), Value::String(scope.value().to_string()));
    }

    let record = list.update(args.id(), fields).await?;
    Ok(Out::new(format!("Updated record {}", record.id()), record))
}
