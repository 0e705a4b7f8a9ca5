use crate::args::InitArgs;
use crate::commands::Out;
use crate::{Config, Result};
use std::path::Path;

/// Creates the home directory and an initial `config.json` file pointing at the record store
/// described by `args`.
///
/// # Errors
/// - Returns an error if the URL or collection is unusable or if any file operations fail.
pub async fn init(elist_home: &Path, args: &InitArgs) -> Result<Out<()>> {
    let config = Config::create(
        elist_home,
        args.base_url(),
        args.collection(),
        args.scope_field(),
    )
    .await?;
    Ok(format!(
        "Successfully created the elist config at {}",
        config.config_path().display()
    )
    .into())
}
