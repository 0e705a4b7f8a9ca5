use crate::args::ShowArgs;
use crate::commands::Out;
use crate::container::EntityList;
use crate::error::{ErrorType, IntoResult};
use crate::model::Record;
use crate::Result;

/// Prints a single record of the current scope as JSON. When the list is configured with
/// `fallback_fetch`, a record that is not part of the loaded list is fetched from the store.
pub async fn show(list: EntityList, args: ShowArgs) -> Result<Out<Record>> {
    list.load().await?;
    let record = list.select(args.id()).await?;
    let message = serde_json::to_string_pretty(&record).pub_result(ErrorType::Io)?;
    Ok(Out::new(message, record))
}
