use crate::args::AddArgs;
use crate::commands::{fields_from, Out};
use crate::container::EntityList;
use crate::error::{Error, ErrorType};
use crate::model::Record;
use crate::Result;
use anyhow::anyhow;
use serde_json::Value;

/// Creates a record from the `--field` pairs in `args`.
///
/// When the list is scoped, the scope field of the new record is set to the current scope value so
/// that the record lands in the caller's partition.
///
/// # Errors
///
/// - Returns an error if the list is scoped but no scope value is set.
/// - Returns an error if the record store rejects the record.
pub async fn add(list: EntityList, args: AddArgs) -> Result<Out<Record>> {
    let mut fields = fields_from(args.fields());
    if let Some(field) = &list.options().scope_field {
        let Some(scope) = list.scope() else {
            let e = anyhow!("Records are partitioned by '{field}', pass --scope to add one");
            return Err(Error::new(ErrorType::Request, e));
        };
        fields.set(field, Value::String(scope.value().to_string()));
    }
    let record = list.create(fields).await?;
    Ok(Out::new(format!("Added record {}", record.id()), record))
}
