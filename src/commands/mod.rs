pub mod parser;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

pub use parser::Command;

/// Loaded command definitions, keyed by name and by every alias. Reloads swap
/// the whole map at once, so lookups racing a reload see either the old set
/// or the new set, never a mix.
pub struct CommandRegistry {
    dir: PathBuf,
    commands: ArcSwap<HashMap<String, Arc<Command>>>,
}

impl CommandRegistry {
    /// Registry with no commands, remembering the directory for later reloads.
    pub fn empty(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            commands: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Load every command file in `dir`.
    pub async fn load(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        let commands = parser::load_dir(&dir).await?;
        info!(count = commands.len(), path = %dir.display(), "loaded commands");
        Ok(Self {
            dir,
            commands: ArcSwap::from_pointee(commands),
        })
    }

    /// Re-read the directory and swap in the result. Returns the number of
    /// entries (names plus aliases) now registered.
    pub async fn reload(&self) -> io::Result<usize> {
        let commands = parser::load_dir(&self.dir).await?;
        let count = commands.len();
        self.commands.store(Arc::new(commands));
        info!(count, path = %self.dir.display(), "reloaded commands");
        Ok(count)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Command>> {
        self.commands.load().get(&name.to_lowercase()).cloned()
    }

    pub fn len(&self) -> usize {
        self.commands.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.load().is_empty()
    }
}
