use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".breakbot"))
            .unwrap_or_else(|| PathBuf::from(".breakbot"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Root for browser user-data directories.
    pub fn browser_dir(&self) -> PathBuf {
        self.base.join("browser")
    }

    pub fn browser_profile(&self, session_name: &str) -> PathBuf {
        let safe = session_name.replace([':', '/', '\\'], "_");
        self.browser_dir().join("sessions").join(safe)
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.browser_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
