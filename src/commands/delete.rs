use crate::args::DeleteArgs;
use crate::commands::{plural, Out};
use crate::container::EntityList;
use crate::model::RecordId;
use crate::Result;

/// Deletes one or more records by id.
///
/// Records are deleted one-by-one. Each id must belong to the current scope. If an error occurs
/// partway through, the records before it have already been deleted.
pub async fn delete(list: EntityList, args: DeleteArgs) -> Result<Out<Vec<RecordId>>> {
    list.load().await?;
    let mut deleted = Vec::with_capacity(args.ids().len());
    for id in args.ids() {
        list.select(id).await?;
        list.remove(id).await?;
        deleted.push(id.clone());
    }
    let message = format!("Deleted {}", plural(deleted.len(), "record"));
    Ok(Out::new(message, deleted))
}
