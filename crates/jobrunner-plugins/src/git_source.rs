// GitSource: clones every `git` source of a job with one transport command each.

use async_trait::async_trait;
use jobrunner_sdk::{Context, Source, SourceDescriptor, StringUtil, Transport};

/// Registered name of the git source.
pub const SOURCE_TYPE: &str = "git";

/// Fields: `url` (required), `ref` (branch or tag), `path` (clone target,
/// defaults to the repository name) and `depth`. String fields may carry
/// `%{key}` placeholders.
#[derive(Debug, Default)]
pub struct GitSource;

impl GitSource {
    /// Build the clone command for one descriptor.
    pub fn clone_command(context: &Context, source: &SourceDescriptor) -> anyhow::Result<String> {
        let url = source
            .field_str("url")
            .ok_or_else(|| anyhow::anyhow!("git source is missing 'url'"))?;
        let url = context.interpolate(url)?;

        let path = match source.field_str("path") {
            Some(path) => context.interpolate(path)?,
            None => repository_name(&url),
        };

        let mut command = String::from("git clone");
        if let Some(depth) = source.fields.get("depth").and_then(|d| d.as_u64()) {
            command.push_str(&format!(" --depth {}", depth));
        }
        if let Some(reference) = source.field_str("ref") {
            let reference = context.interpolate(reference)?;
            command.push_str(&format!(" --branch {}", StringUtil::shell_quote(&reference)));
        }
        command.push_str(&format!(
            " -- {} {}",
            StringUtil::shell_quote(&url),
            StringUtil::shell_quote(&path)
        ));
        Ok(command)
    }
}

/// `https://host/org/app.git` → `app`.
fn repository_name(url: &str) -> String {
    let last = url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(url);
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        "source".to_string()
    } else {
        name.to_string()
    }
}

#[async_trait]
impl Source for GitSource {
    async fn checkout(
        &self,
        transport: &dyn Transport,
        context: &Context,
        sources: &[SourceDescriptor],
    ) -> anyhow::Result<bool> {
        for source in sources {
            let command = Self::clone_command(context, source)?;
            if !transport.exec(&command, None).await? {
                tracing::warn!("git clone exited with {}", transport.exit_code());
                return Ok(false);
            }
        }
        Ok(true)
    }
}
