//! Filesystem tenant configuration: one `<tenant>.toml` per tenant with a
//! `[themes.<name>]` table per theme

use async_trait::async_trait;
use regex::Regex;
use reposter_domain::{
    AgeClass, AgeThresholds, FingerprintMode, LengthBounds, Signature, SourceGroup,
    SourceSampling, TenantConfigError, TenantConfigSource, TenantThemeConfig, TenantThemeKey,
    ThemeRule,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").expect("Valid regex"));

pub const DEFAULT_URL_BASE: &str = "https://vk.com/wall";

fn default_url_base() -> String {
    DEFAULT_URL_BASE.to_string()
}

fn default_history_limit() -> usize {
    200
}

fn default_recent_window() -> u32 {
    100
}

fn default_fetch_count() -> u32 {
    20
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TenantFile {
    #[serde(default)]
    read_accounts: Vec<String>,
    write_account: Option<String>,
    destination: Option<i64>,
    #[serde(default)]
    blacklist: Vec<String>,
    #[serde(default)]
    deny_sources: Vec<i64>,
    #[serde(default = "default_url_base")]
    canonical_url_base: String,
    #[serde(default = "default_history_limit")]
    history_limit: usize,
    #[serde(default = "default_recent_window")]
    recent_window: u32,
    #[serde(default = "default_fetch_count")]
    fetch_count: u32,
    #[serde(default)]
    age_thresholds: AgeThresholds,
    #[serde(default)]
    signature: SignatureFile,
    max_post_chars: Option<usize>,
    #[serde(default)]
    themes: BTreeMap<String, ThemeFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SignatureFile {
    title: Option<String>,
    hashtag: Option<String>,
    closing: Option<String>,
    attribution_phrases: Option<Vec<String>>,
}

impl SignatureFile {
    fn over(&self, base: &SignatureFile) -> Signature {
        let pick = |theme: &Option<String>, tenant: &Option<String>| {
            theme.clone().or_else(|| tenant.clone()).unwrap_or_default()
        };
        Signature {
            title: pick(&self.title, &base.title),
            hashtag: pick(&self.hashtag, &base.hashtag),
            closing: pick(&self.closing, &base.closing),
            attribution_phrases: self
                .attribution_phrases
                .clone()
                .or_else(|| base.attribution_phrases.clone())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ThemeFile {
    #[serde(default)]
    sources: Vec<SourceGroup>,
    #[serde(default)]
    sampling: SourceSampling,
    #[serde(default)]
    age_class: AgeClass,
    #[serde(default)]
    rule: ThemeRule,
    text_only: Option<LengthBounds>,
    #[serde(default)]
    strip_phrases: Vec<String>,
    #[serde(default)]
    blacklist: Vec<String>,
    #[serde(default)]
    deny_sources: Vec<i64>,
    #[serde(default)]
    signature: SignatureFile,
    #[serde(default)]
    fingerprint_mode: FingerprintMode,
    write_account: Option<String>,
    destination: Option<i64>,
    max_post_chars: Option<usize>,
    history_limit: Option<usize>,
    fetch_count: Option<u32>,
    recent_window: Option<u32>,
}

/// Filesystem tenant configuration repository
pub struct FsTenantRepo {
    tenants_dir: PathBuf,
    global_blacklist: Vec<String>,
}

impl FsTenantRepo {
    /// Create a repository over an existing directory
    pub fn new(
        tenants_dir: impl AsRef<Path>,
        global_blacklist: Vec<String>,
    ) -> Result<Self, TenantConfigError> {
        let tenants_dir = tenants_dir.as_ref().to_path_buf();

        if !tenants_dir.exists() {
            return Err(TenantConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Tenants directory not found: {}", tenants_dir.display()),
            )));
        }

        Ok(Self {
            tenants_dir,
            global_blacklist,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.tenants_dir
    }

    /// Load and validate every configured (tenant, theme) pair
    pub async fn validate_all(&self) -> Result<Vec<TenantThemeConfig>, TenantConfigError> {
        let mut configs = Vec::new();
        for key in self.list().await? {
            configs.push(self.load(&key.tenant, &key.theme).await?);
        }
        Ok(configs)
    }

    fn validate_id(&self, id: &str) -> Result<(), TenantConfigError> {
        if !ID_PATTERN.is_match(id) {
            return Err(TenantConfigError::InvalidId { id: id.to_string() });
        }
        Ok(())
    }

    fn read_tenant(&self, tenant: &str) -> Result<TenantFile, TenantConfigError> {
        self.validate_id(tenant)?;
        let path = self.tenants_dir.join(format!("{}.toml", tenant));
        if !path.is_file() {
            return Err(TenantConfigError::UnknownTenant(tenant.to_string()));
        }

        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content).map_err(|e| TenantConfigError::Parse {
            file: path.display().to_string(),
            message: e.to_string(),
        })
    }

    fn merge(
        &self,
        tenant: &str,
        theme: &str,
        file: &TenantFile,
        theme_file: &ThemeFile,
    ) -> TenantThemeConfig {
        TenantThemeConfig {
            tenant: tenant.to_string(),
            theme: theme.to_string(),
            sources: theme_file.sources.clone(),
            sampling: theme_file.sampling,
            fetch_count: theme_file.fetch_count.unwrap_or(file.fetch_count),
            destination: theme_file.destination.or(file.destination).unwrap_or(0),
            blacklist: file
                .blacklist
                .iter()
                .chain(&theme_file.blacklist)
                .cloned()
                .collect(),
            global_blacklist: self.global_blacklist.clone(),
            deny_sources: file
                .deny_sources
                .iter()
                .chain(&theme_file.deny_sources)
                .copied()
                .collect(),
            age_class: theme_file.age_class,
            age_thresholds: file.age_thresholds,
            rule: theme_file.rule.clone(),
            text_only: theme_file.text_only,
            strip_phrases: theme_file.strip_phrases.clone(),
            signature: theme_file.signature.over(&file.signature),
            max_post_chars: theme_file.max_post_chars.or(file.max_post_chars),
            history_limit: theme_file.history_limit.unwrap_or(file.history_limit),
            fingerprint_mode: theme_file.fingerprint_mode,
            recent_window: theme_file.recent_window.unwrap_or(file.recent_window),
            read_accounts: file.read_accounts.clone(),
            write_account: theme_file
                .write_account
                .clone()
                .or_else(|| file.write_account.clone())
                .unwrap_or_default(),
            canonical_url_base: file.canonical_url_base.clone(),
        }
    }
}

fn invalid(config: &TenantThemeConfig, field: &str, message: &str) -> TenantConfigError {
    TenantConfigError::Validation {
        key: format!("{}.{}.{}", config.tenant, config.theme, field),
        message: message.to_string(),
    }
}

/// Check the invariants a runnable theme needs
pub fn validate_config(config: &TenantThemeConfig) -> Result<(), TenantConfigError> {
    if config.sources.is_empty() {
        return Err(invalid(config, "sources", "at least one source group is required"));
    }
    if let Some(group) = config.sources.iter().find(|g| g.id == 0) {
        return Err(invalid(
            config,
            "sources",
            &format!("source group '{}' has id 0", group.name),
        ));
    }
    if config.destination == 0 {
        return Err(invalid(config, "destination", "destination wall id is required"));
    }
    if config.write_account.trim().is_empty() {
        return Err(invalid(config, "write_account", "write account is required"));
    }
    if config.history_limit == 0 {
        return Err(invalid(config, "history_limit", "must be at least 1"));
    }
    if config.fetch_count == 0 {
        return Err(invalid(config, "fetch_count", "must be at least 1"));
    }
    if let Some(bounds) = config.text_only {
        if bounds.min >= bounds.max {
            return Err(invalid(config, "text_only", "min must be below max"));
        }
    }
    if let ThemeRule::Media { kinds } = &config.rule {
        if kinds.is_empty() {
            return Err(invalid(config, "rule", "media rule needs at least one kind"));
        }
    }
    Ok(())
}

#[async_trait]
impl TenantConfigSource for FsTenantRepo {
    async fn load(
        &self,
        tenant: &str,
        theme: &str,
    ) -> Result<TenantThemeConfig, TenantConfigError> {
        let file = self.read_tenant(tenant)?;
        self.validate_id(theme)?;
        let theme_file = file
            .themes
            .get(theme)
            .ok_or_else(|| TenantConfigError::UnknownTheme {
                tenant: tenant.to_string(),
                theme: theme.to_string(),
            })?;

        let config = self.merge(tenant, theme, &file, theme_file);
        validate_config(&config)?;
        Ok(config)
    }

    async fn list(&self) -> Result<Vec<TenantThemeKey>, TenantConfigError> {
        let mut keys = Vec::new();

        for entry in std::fs::read_dir(&self.tenants_dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }

            let tenant = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
                TenantConfigError::Parse {
                    file: path.display().to_string(),
                    message: "Invalid filename".to_string(),
                }
            })?;

            let file = self.read_tenant(tenant)?;
            for theme in file.themes.keys() {
                self.validate_id(theme)?;
                keys.push(TenantThemeKey::new(tenant, theme));
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reposter_domain::AttachmentKind;
    use tempfile::TempDir;

    const RIVERSIDE: &str = r##"
read_accounts = ["reader_main", "reader_spare"]
write_account = "riverside_admin"
destination = -900
blacklist = ["casino"]
history_limit = 150

[signature]
title = "Riverside\n"
hashtag = "#riverside"
closing = "\nStay tuned"
attribution_phrases = ["via {source}"]

[themes.news]
age_class = "urgent"
text_only = { min = 30, max = 300 }
sources = [
  { id = -100, name = "Riverside Today" },
  { id = -200, name = "Riverside Board", open = true },
]

[themes.music]
sampling = "random_one"
age_class = "relaxed"
rule = { kind = "media", kinds = ["audio", "video"] }
write_account = "riverside_music"
blacklist = ["karaoke"]
sources = [{ id = -300, name = "Tunes" }]

[themes.music.signature]
hashtag = "#riverside_music"
"##;

    fn setup(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_load_merges_tenant_and_theme() {
        let dir = setup(&[("riverside.toml", RIVERSIDE)]);
        let repo = FsTenantRepo::new(dir.path(), vec!["quick loans".to_string()]).unwrap();

        let config = repo.load("riverside", "news").await.unwrap();

        assert_eq!(config.destination, -900);
        assert_eq!(config.write_account, "riverside_admin");
        assert_eq!(config.read_accounts.len(), 2);
        assert_eq!(config.age_class, AgeClass::Urgent);
        assert_eq!(config.text_only, Some(LengthBounds { min: 30, max: 300 }));
        assert_eq!(config.history_limit, 150);
        assert_eq!(config.fetch_count, 20);
        assert_eq!(config.canonical_url_base, DEFAULT_URL_BASE);
        assert_eq!(config.global_blacklist, vec!["quick loans".to_string()]);
        assert!(config.is_open_group(-200));
        assert_eq!(config.signature.hashtag, "#riverside");
    }

    #[tokio::test]
    async fn test_theme_overrides() {
        let dir = setup(&[("riverside.toml", RIVERSIDE)]);
        let repo = FsTenantRepo::new(dir.path(), vec![]).unwrap();

        let config = repo.load("riverside", "music").await.unwrap();

        assert_eq!(config.write_account, "riverside_music");
        assert_eq!(config.sampling, SourceSampling::RandomOne);
        assert_eq!(config.blacklist, vec!["casino", "karaoke"]);
        assert_eq!(
            config.rule,
            ThemeRule::Media {
                kinds: vec![AttachmentKind::Audio, AttachmentKind::Video]
            }
        );
        assert_eq!(config.signature.hashtag, "#riverside_music");
        assert_eq!(config.signature.title, "Riverside\n");
        assert_eq!(config.text_only, None);
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let dir = setup(&[
            ("riverside.toml", RIVERSIDE),
            (
                "hillside.toml",
                "write_account = \"w\"\ndestination = -1\n[themes.ads]\nsources = [{ id = -5, name = \"Ads\" }]\n",
            ),
            ("notes.txt", "ignored"),
        ]);
        let repo = FsTenantRepo::new(dir.path(), vec![]).unwrap();

        let keys = repo.list().await.unwrap();

        let names: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(names, vec!["hillside/ads", "riverside/music", "riverside/news"]);
    }

    #[tokio::test]
    async fn test_unknown_tenant_and_theme() {
        let dir = setup(&[("riverside.toml", RIVERSIDE)]);
        let repo = FsTenantRepo::new(dir.path(), vec![]).unwrap();

        assert!(matches!(
            repo.load("lakeside", "news").await,
            Err(TenantConfigError::UnknownTenant(_))
        ));
        assert!(matches!(
            repo.load("riverside", "sports").await,
            Err(TenantConfigError::UnknownTheme { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_id_error() {
        let dir = setup(&[("riverside.toml", RIVERSIDE)]);
        let repo = FsTenantRepo::new(dir.path(), vec![]).unwrap();

        assert!(matches!(
            repo.load("../etc", "news").await,
            Err(TenantConfigError::InvalidId { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_write_account_fails_validation() {
        let dir = setup(&[(
            "bare.toml",
            "destination = -1\n[themes.news]\nsources = [{ id = -5, name = \"News\" }]\n",
        )]);
        let repo = FsTenantRepo::new(dir.path(), vec![]).unwrap();

        let err = repo.load("bare", "news").await.unwrap_err();

        match err {
            TenantConfigError::Validation { key, .. } => assert_eq!(key, "bare.news.write_account"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_parse_error_names_file() {
        let dir = setup(&[("broken.toml", "destination = [not toml")]);
        let repo = FsTenantRepo::new(dir.path(), vec![]).unwrap();

        let err = repo.load("broken", "news").await.unwrap_err();

        assert!(matches!(err, TenantConfigError::Parse { ref file, .. } if file.ends_with("broken.toml")));
    }

    #[tokio::test]
    async fn test_validate_all_reports_first_bad_theme() {
        let dir = setup(&[(
            "riverside.toml",
            "write_account = \"w\"\ndestination = -1\n[themes.news]\nsources = []\n",
        )]);
        let repo = FsTenantRepo::new(dir.path(), vec![]).unwrap();

        assert!(matches!(
            repo.validate_all().await,
            Err(TenantConfigError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_nonexistent_directory() {
        assert!(FsTenantRepo::new("/nonexistent/path", vec![]).is_err());
    }
}
