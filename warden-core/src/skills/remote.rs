//! Remote skill cache: `owner/repo[@sha]` refs fetched into the state
//! directory via the VCS subprocess.
//!
//! Layout under `<state_dir>/skills/`:
//! - unpinned refs → `<owner>/<repo>/`
//! - pinned refs   → `<owner>/<repo>@<sha>/`
//! - ledger        → `state.json` (`{remotes: {ref → {sha, fetched_at}}}`)
//!
//! Pinned refs are immutable: a valid cache directory answers without
//! touching the network. Unpinned refs refresh after the TTL expires.
//! Ledger writes are atomic (write `.tmp`, then rename). The subprocess is
//! always invoked with argument vectors, untrusted values behind `--`, and
//! ref validation rejects a leading `-` in any component upstream.
//!
//! Concurrent runs against the same state directory are not supported;
//! the ledger is single-writer per process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::{SkillError, WardenResult};
use crate::state::{skill_cache_ttl, state_dir};

/// A validated reference to a remote skill repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub owner: String,
    pub repo: String,
    /// Pinned commit; `None` means "track the default branch".
    pub sha: Option<String>,
}

impl RemoteRef {
    pub fn is_pinned(&self) -> bool {
        self.sha.is_some()
    }

    /// Clone URL for the VCS subprocess.
    pub fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.repo)
    }
}

impl std::fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sha {
            Some(sha) => write!(f, "{}/{}@{}", self.owner, self.repo, sha),
            None => write!(f, "{}/{}", self.owner, self.repo),
        }
    }
}

/// Parses `owner/repo[@sha]`, also accepting the HTTPS and SSH URL forms
/// (`https://github.com/owner/repo[.git]`, `git@github.com:owner/repo`).
///
/// Rejects empty components, `/` inside the repo name, and a leading `-`
/// anywhere (flag-injection guard for the subprocess).
pub fn parse_remote_ref(input: &str) -> Result<RemoteRef, SkillError> {
    let bad = |reason: &str| SkillError::InvalidRef {
        reference: input.to_string(),
        reason: reason.to_string(),
    };

    let mut rest = input.trim();
    for prefix in ["https://github.com/", "http://github.com/", "git@github.com:"] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }

    let (path, sha) = match rest.split_once('@') {
        Some((p, s)) => (p, Some(s)),
        None => (rest, None),
    };
    let path = path.strip_suffix(".git").unwrap_or(path);

    let (owner, repo) = path
        .split_once('/')
        .ok_or_else(|| bad("expected owner/repo"))?;
    if owner.is_empty() || repo.is_empty() {
        return Err(bad("owner and repo must be non-empty"));
    }
    if repo.contains('/') {
        return Err(bad("repo must not contain '/'"));
    }
    for part in [owner, repo] {
        if part.starts_with('-') {
            return Err(bad("components must not start with '-'"));
        }
    }

    let sha = match sha {
        None => None,
        Some(s) => {
            if s.len() < 7
                || s.len() > 40
                || !s.chars().all(|c| c.is_ascii_hexdigit())
                || s.chars().any(|c| c.is_ascii_uppercase())
            {
                return Err(bad("sha must be 7-40 lowercase hex chars"));
            }
            Some(s.to_string())
        }
    };

    Ok(RemoteRef {
        owner: owner.to_string(),
        repo: repo.to_string(),
        sha,
    })
}

/// One persisted ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub sha: String,
    /// RFC 3339 fetch timestamp.
    pub fetched_at: DateTime<Utc>,
}

/// The persisted ledger, atomically replaced on every mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteState {
    #[serde(default)]
    pub remotes: BTreeMap<String, RemoteEntry>,
}

/// Options for [`RemoteSkillCache::fetch_remote`].
#[derive(Default)]
pub struct FetchOptions<'a> {
    /// Refresh even when the cache is still valid.
    pub force: bool,
    /// Never touch the network; fail on cache misses.
    pub offline: bool,
    /// Stage callback (`"cloning"`, `"fetching"`, ...).
    pub on_progress: Option<&'a (dyn Fn(&str) + Send + Sync)>,
}

/// The cache itself; owns the state directory layout and the ledger.
pub struct RemoteSkillCache {
    state_dir: PathBuf,
    ttl: Duration,
    vcs_bin: String,
}

impl RemoteSkillCache {
    pub fn new(state_dir: PathBuf, ttl: Duration) -> Self {
        Self {
            state_dir,
            ttl,
            vcs_bin: "git".to_string(),
        }
    }

    /// Cache rooted at `WARDEN_STATE_DIR` with `WARDEN_SKILL_CACHE_TTL`.
    pub fn from_env() -> WardenResult<Self> {
        Ok(Self::new(state_dir(), skill_cache_ttl()?))
    }

    /// Overrides the VCS binary (tests point this at a stub).
    pub fn with_vcs_bin(mut self, bin: impl Into<String>) -> Self {
        self.vcs_bin = bin.into();
        self
    }

    fn skills_root(&self) -> PathBuf {
        self.state_dir.join("skills")
    }

    /// Cache directory for a ref: `owner/repo` or `owner/repo@sha`.
    pub fn cache_dir(&self, reference: &RemoteRef) -> PathBuf {
        let leaf = match &reference.sha {
            Some(sha) => format!("{}@{}", reference.repo, sha),
            None => reference.repo.clone(),
        };
        self.skills_root().join(&reference.owner).join(leaf)
    }

    fn state_path(&self) -> PathBuf {
        self.skills_root().join("state.json")
    }

    /// Reads the ledger; a missing file is an empty ledger.
    pub async fn load_state(&self) -> WardenResult<RemoteState> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(RemoteState::default());
        }
        let data = tokio::fs::read(&path).await?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Atomically replaces the ledger: write `state.json.tmp`, then rename.
    pub async fn save_state(&self, state: &RemoteState) -> WardenResult<()> {
        let path = self.state_path();
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Ensures the ref is present in the cache and returns its commit sha.
    ///
    /// - Pinned + valid cache + not force → the pinned sha, no subprocess.
    /// - Unpinned + valid cache + fresh ledger entry → the cached sha.
    /// - Offline → the ledger sha when cache + entry exist, else an error.
    /// - Otherwise clone/fetch, then re-read `HEAD` and persist the ledger.
    pub async fn fetch_remote(
        &self,
        reference: &RemoteRef,
        opts: FetchOptions<'_>,
    ) -> WardenResult<String> {
        let key = reference.to_string();
        let dir = self.cache_dir(reference);
        let cache_valid = dir.join(".git").is_dir();

        if let (Some(sha), true, false) = (&reference.sha, cache_valid, opts.force) {
            debug!("skills: {} pinned cache hit", key);
            return Ok(sha.clone());
        }

        let mut state = self.load_state().await?;

        if opts.offline {
            return match state.remotes.get(&key) {
                Some(entry) if cache_valid => {
                    debug!("skills: {} offline cache hit", key);
                    Ok(entry.sha.clone())
                }
                _ => Err(SkillError::OfflineMiss(key).into()),
            };
        }

        if !reference.is_pinned() && cache_valid && !opts.force {
            if let Some(entry) = state.remotes.get(&key) {
                let age = Utc::now().signed_duration_since(entry.fetched_at);
                if age.num_seconds() >= 0 && (age.num_seconds() as u64) <= self.ttl.as_secs() {
                    debug!("skills: {} fresh (age {}s), no fetch", key, age.num_seconds());
                    return Ok(entry.sha.clone());
                }
            }
        }

        self.materialize(reference, &dir, cache_valid, &opts).await?;

        let sha = self.rev_parse_head(&dir).await?;
        state.remotes.insert(
            key.clone(),
            RemoteEntry {
                sha: sha.clone(),
                fetched_at: Utc::now(),
            },
        );
        self.save_state(&state).await?;
        info!("skills: {} → {}", key, &sha[..sha.len().min(12)]);
        Ok(sha)
    }

    /// Brings the cache directory up to date over the network.
    async fn materialize(
        &self,
        reference: &RemoteRef,
        dir: &Path,
        cache_valid: bool,
        opts: &FetchOptions<'_>,
    ) -> WardenResult<()> {
        let progress = |stage: &str| {
            if let Some(cb) = opts.on_progress {
                cb(stage);
            }
        };

        if !cache_valid {
            if let Some(parent) = dir.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            progress("cloning");
            let url = reference.clone_url();
            let dir_str = dir.to_string_lossy().into_owned();
            self.vcs(
                reference,
                &["clone", "--depth", "1", "--", &url, &dir_str],
                None,
            )
            .await?;

            if let Some(sha) = &reference.sha {
                progress("fetching");
                // Shallow fetch of the pinned commit; unshallow only if
                // the server refuses to serve it directly.
                if self
                    .vcs(reference, &["fetch", "--depth", "1", "origin", sha], Some(dir))
                    .await
                    .is_err()
                {
                    self.vcs(reference, &["fetch", "--unshallow", "origin"], Some(dir))
                        .await?;
                }
                progress("checking out");
                self.vcs(reference, &["checkout", "--detach", sha], Some(dir))
                    .await?;
            }
            return Ok(());
        }

        if reference.is_pinned() {
            // Existing pinned caches never touch the network; `force` only
            // re-reads HEAD and refreshes the ledger row.
            return Ok(());
        }

        progress("fetching");
        self.vcs(reference, &["fetch", "--depth", "1", "origin"], Some(dir))
            .await?;
        progress("resetting");
        self.vcs(reference, &["reset", "--hard", "origin/HEAD"], Some(dir))
            .await?;
        Ok(())
    }

    async fn rev_parse_head(&self, dir: &Path) -> WardenResult<String> {
        let out = self
            .vcs_raw(&["rev-parse", "HEAD"], Some(dir))
            .await
            .map_err(|detail| SkillError::Fetch {
                reference: dir.display().to_string(),
                detail,
            })?;
        Ok(out.trim().to_string())
    }

    async fn vcs(
        &self,
        reference: &RemoteRef,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> WardenResult<String> {
        self.vcs_raw(args, cwd).await.map_err(|detail| {
            SkillError::Fetch {
                reference: reference.to_string(),
                detail,
            }
            .into()
        })
    }

    /// Runs the VCS tool with an argument vector (never a shell string).
    async fn vcs_raw(&self, args: &[&str], cwd: Option<&Path>) -> Result<String, String> {
        debug!("skills: {} {}", self.vcs_bin, args.join(" "));
        let mut cmd = Command::new(&self.vcs_bin);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| format!("failed to spawn {}: {e}", self.vcs_bin))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} {} exited with {}: {}",
                self.vcs_bin,
                args.first().unwrap_or(&""),
                output.status,
                stderr.trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Discovers skills inside a fetched remote.
    ///
    /// Tries the plugin-marketplace layout first
    /// (`.claude-plugin/marketplace.json`, each plugin with a `skills/`
    /// directory), then the traditional layout (root, `skills/`,
    /// `.warden/skills/`, `.agents/skills/`, `.claude/skills/`).
    /// Duplicate names: first occurrence wins.
    pub fn discover(&self, reference: &RemoteRef) -> Vec<(String, PathBuf)> {
        discover_skills(&self.cache_dir(reference))
    }
}

/// See [`RemoteSkillCache::discover`].
pub fn discover_skills(root: &Path) -> Vec<(String, PathBuf)> {
    use crate::skills::skills_in_dir;

    let mut found: Vec<(String, PathBuf)> = Vec::new();
    let mut push_unique = |items: Vec<(String, PathBuf)>, found: &mut Vec<(String, PathBuf)>| {
        for (name, path) in items {
            if !found.iter().any(|(n, _)| n == &name) {
                found.push((name, path));
            }
        }
    };

    if let Some(marketplace) = read_marketplace(root) {
        for plugin in marketplace.plugins {
            let base = match &plugin.source {
                Some(source) => root.join(source.trim_start_matches("./")),
                None => root.join(&plugin.name),
            };
            push_unique(skills_in_dir(&base.join("skills")), &mut found);
        }
        if !found.is_empty() {
            return found;
        }
    }

    for rel in ["", "skills", ".warden/skills", ".agents/skills", ".claude/skills"] {
        let dir = if rel.is_empty() {
            root.to_path_buf()
        } else {
            root.join(rel)
        };
        push_unique(skills_in_dir(&dir), &mut found);
    }
    found
}

#[derive(Deserialize)]
struct Marketplace {
    #[serde(default)]
    plugins: Vec<MarketplacePlugin>,
}

#[derive(Deserialize)]
struct MarketplacePlugin {
    #[serde(default)]
    name: String,
    #[serde(default)]
    source: Option<String>,
}

fn read_marketplace(root: &Path) -> Option<Marketplace> {
    let path = root.join(".claude-plugin").join("marketplace.json");
    let data = std::fs::read(path).ok()?;
    serde_json::from_slice(&data).ok()
}
