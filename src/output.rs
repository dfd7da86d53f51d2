//! Writing generated client configs to disk

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{WgClientError, WgClientResult};
use crate::registry::{Registry, Users};
use crate::render::{render_client_config, TemplateContext};

/// A rendered config and the file name it goes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    pub filename: String,
    /// Name of the user it was rendered for
    pub user: String,
    pub content: String,
}

/// Render every configured variant of every user in `users`
///
/// Fails without returning anything if a single variant cannot be rendered
/// or if two variants map to the same file name.
pub fn render_all(registry: &Registry, users: &Users) -> WgClientResult<Vec<RenderedConfig>> {
    let mut rendered = Vec::new();
    let mut owners: HashMap<String, String> = HashMap::new();

    for (key, user) in users.sorted() {
        for cc in &user.client_configs {
            let filename = user.filename(cc);
            if let Some(previous) = owners.insert(filename.clone(), user.name.clone()) {
                return Err(WgClientError::AlreadyExists(format!(
                    "{} is generated for both '{}' and '{}'",
                    filename, previous, user.name
                )));
            }

            let ctx = TemplateContext::for_client(registry, key, user, cc)?;
            rendered.push(RenderedConfig {
                filename,
                user: user.name.clone(),
                content: render_client_config(&ctx),
            });
        }
    }

    Ok(rendered)
}

/// Ensure a directory exists, creating it if necessary
pub async fn ensure_directory_exists(path: &Path) -> WgClientResult<()> {
    if !path.exists() {
        tokio::fs::create_dir_all(path).await?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

/// Write a file and restrict its permissions
pub async fn write_secure_config(path: &Path, content: &str, permissions: u32) -> WgClientResult<()> {
    tokio::fs::write(path, content).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(permissions)).await?;
    }

    debug!("Wrote config to {:?} with permissions {:o}", path, permissions);
    Ok(())
}

/// Render the configs for `users` and write them under `dir`
///
/// Nothing is written unless every config rendered.
pub async fn write_client_configs(
    dir: &Path,
    registry: &Registry,
    users: &Users,
    file_mode: u32,
) -> WgClientResult<Vec<PathBuf>> {
    let rendered = render_all(registry, users)?;

    ensure_directory_exists(dir).await?;

    let mut written = Vec::with_capacity(rendered.len());
    for cfg in &rendered {
        let path = dir.join(&cfg.filename);
        write_secure_config(&path, &cfg.content, file_mode).await?;
        info!(user = %cfg.user, "Wrote {}", cfg.filename);
        written.push(path);
    }

    info!("Wrote {} client configs to {:?}", written.len(), dir);
    Ok(written)
}
