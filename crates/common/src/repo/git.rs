use std::fmt;
use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{
    Cred, CredentialType, ErrorCode, FetchOptions, IndexAddOption, Oid, PushOptions,
    RemoteCallbacks, RepositoryInitOptions, Signature, StatusOptions,
};

use super::error::classify;
use super::{Relation, Repository, RepositoryError, SnapshotId};

/// Name of the remote the vault synchronizes with.
pub const DEFAULT_REMOTE: &str = "origin";

/// Give up on credentials after this many prompts; libgit2 keeps asking
/// otherwise.
const MAX_AUTH_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct GitConfig {
    /// Remote repository URL; `None` keeps history local only.
    pub remote_url: Option<String>,
    pub branch: String,
    pub author_name: String,
    pub author_email: String,
    /// Personal access token for HTTPS remotes.
    pub token: Option<String>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            branch: "main".to_string(),
            author_name: "git3".to_string(),
            author_email: "git3@sync".to_string(),
            token: None,
        }
    }
}

impl fmt::Debug for GitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitConfig")
            .field("remote_url", &self.remote_url)
            .field("branch", &self.branch)
            .field("author_name", &self.author_name)
            .field("author_email", &self.author_email)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// [`Repository`] backed by libgit2, operating on the vault working copy.
pub struct GitRepository {
    repo: git2::Repository,
    workdir: PathBuf,
    config: GitConfig,
}

impl fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitRepository")
            .field("workdir", &self.workdir)
            .field("config", &self.config)
            .finish()
    }
}

impl GitRepository {
    /// Open the working copy at `dir`, initializing a repository there if it
    /// is not one yet, and point the default remote at the configured URL.
    ///
    /// Remote history is not downloaded here; the first pull does that.
    pub fn open_or_init(dir: &Path, config: GitConfig) -> Result<Self, RepositoryError> {
        if let Some(url) = &config.remote_url {
            check_supported(url)?;
        }
        std::fs::create_dir_all(dir)?;

        let repo = match git2::Repository::open(dir) {
            Ok(repo) => {
                tracing::info!(dir = %dir.display(), "opened existing repository");
                repo
            }
            Err(e) if e.code() == ErrorCode::NotFound => {
                let mut options = RepositoryInitOptions::new();
                options.initial_head(&config.branch);
                let repo = git2::Repository::init_opts(dir, &options)?;
                tracing::info!(dir = %dir.display(), branch = %config.branch, "initialized repository");
                repo
            }
            Err(e) => return Err(e.into()),
        };
        if repo.is_bare() {
            return Err(git2::Error::from_str("the vault must be a working copy, not a bare repository").into());
        }

        let this = Self {
            repo,
            workdir: dir.to_path_buf(),
            config,
        };
        this.configure_remote()?;
        Ok(this)
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Directory inside `.git` for in-progress uploads.
    pub fn staging_dir(&self) -> PathBuf {
        self.repo.path().join("gits3-staging")
    }

    fn configure_remote(&self) -> Result<(), RepositoryError> {
        let Some(url) = &self.config.remote_url else {
            return Ok(());
        };
        match self.repo.find_remote(DEFAULT_REMOTE) {
            Ok(remote) => {
                if remote.url() != Some(url.as_str()) {
                    self.repo.remote_set_url(DEFAULT_REMOTE, url)?;
                    tracing::info!(remote = DEFAULT_REMOTE, "updated remote url");
                }
            }
            Err(e) if e.code() == ErrorCode::NotFound => {
                self.repo.remote(DEFAULT_REMOTE, url)?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn local_ref(&self) -> String {
        format!("refs/heads/{}", self.config.branch)
    }

    fn tracking_ref(&self) -> String {
        format!("refs/remotes/{}/{}", DEFAULT_REMOTE, self.config.branch)
    }

    fn callbacks<'a>(&self) -> RemoteCallbacks<'a> {
        let token = self.config.token.clone();
        let mut attempts = 0;
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |_url, _username, allowed| {
            attempts += 1;
            if attempts > MAX_AUTH_ATTEMPTS {
                return Err(git2::Error::from_str("authentication failed"));
            }
            match &token {
                Some(token) if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) => {
                    Cred::userpass_plaintext("x-access-token", token)
                }
                _ => Cred::default(),
            }
        });
        callbacks
    }

    fn find_commit(&self, id: &SnapshotId) -> Result<git2::Commit<'_>, RepositoryError> {
        let oid = Oid::from_str(id.as_str())?;
        Ok(self.repo.find_commit(oid)?)
    }

    fn head_commit(&self) -> Result<Option<git2::Commit<'_>>, RepositoryError> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn move_branch(&self, to: Oid, reason: &str) -> Result<(), RepositoryError> {
        let local_ref = self.local_ref();
        self.repo.reference(&local_ref, to, true, reason)?;
        self.repo.set_head(&local_ref)?;
        Ok(())
    }
}

impl Repository for GitRepository {
    fn has_remote(&self) -> bool {
        self.config.remote_url.is_some()
    }

    fn head(&self) -> Result<Option<SnapshotId>, RepositoryError> {
        Ok(self
            .head_commit()?
            .map(|commit| SnapshotId::new(commit.id().to_string())))
    }

    fn has_changes(&self) -> Result<bool, RepositoryError> {
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            // a stored .gitignore must not hide objects from versioning
            .include_ignored(true)
            .recurse_ignored_dirs(true);
        let statuses = self.repo.statuses(Some(&mut options))?;
        Ok(statuses
            .iter()
            .any(|entry| entry.status() != git2::Status::CURRENT))
    }

    fn commit(&mut self, message: &str) -> Result<Option<SnapshotId>, RepositoryError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::FORCE, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree_id = index.write_tree()?;

        let parent = self.head_commit()?;
        match &parent {
            Some(parent) if parent.tree_id() == tree_id => return Ok(None),
            None if index.is_empty() => return Ok(None),
            _ => {}
        }

        let tree = self.repo.find_tree(tree_id)?;
        let signature = Signature::now(&self.config.author_name, &self.config.author_email)?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;

        Ok(Some(SnapshotId::new(oid.to_string())))
    }

    fn push(&mut self) -> Result<(), RepositoryError> {
        let Some(head) = self.head_commit()?.map(|commit| commit.id()) else {
            return Ok(());
        };

        let mut remote = self.repo.find_remote(DEFAULT_REMOTE)?;
        let refspec = format!("{0}:{0}", self.local_ref());
        let mut rejection = None;
        {
            let mut callbacks = self.callbacks();
            callbacks.push_update_reference(|refname, status| {
                if let Some(status) = status {
                    rejection = Some(format!("{refname}: {status}"));
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            remote
                .push(&[refspec.as_str()], Some(&mut options))
                .map_err(classify)?;
        }
        if let Some(reason) = rejection {
            return Err(RepositoryError::Rejected(reason));
        }

        self.repo
            .reference(&self.tracking_ref(), head, true, "push")?;
        Ok(())
    }

    fn fetch(&mut self) -> Result<Option<SnapshotId>, RepositoryError> {
        let mut remote = self.repo.find_remote(DEFAULT_REMOTE)?;
        // a glob refspec tolerates a remote that has no branches yet
        let refspec = format!("+refs/heads/*:refs/remotes/{DEFAULT_REMOTE}/*");
        let mut options = FetchOptions::new();
        options.remote_callbacks(self.callbacks());
        remote
            .fetch(&[refspec.as_str()], Some(&mut options), None)
            .map_err(classify)?;

        match self.repo.find_reference(&self.tracking_ref()) {
            Ok(reference) => Ok(reference
                .target()
                .map(|oid| SnapshotId::new(oid.to_string()))),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn relation(
        &self,
        local: &SnapshotId,
        remote: &SnapshotId,
    ) -> Result<Relation, RepositoryError> {
        let local = Oid::from_str(local.as_str())?;
        let remote = Oid::from_str(remote.as_str())?;
        if local == remote {
            return Ok(Relation::Equal);
        }
        let (ahead, behind) = self.repo.graph_ahead_behind(local, remote)?;
        Ok(match (ahead, behind) {
            (0, 0) => Relation::Equal,
            (_, 0) => Relation::Ahead,
            (0, _) => Relation::Behind,
            _ => Relation::Diverged,
        })
    }

    fn fast_forward(&mut self, to: &SnapshotId) -> Result<(), RepositoryError> {
        let commit = self.find_commit(to)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut checkout))
            .map_err(classify)?;
        self.move_branch(commit.id(), &format!("fast-forward to {}", to.short()))
    }

    fn reset_hard(&mut self, to: &SnapshotId) -> Result<(), RepositoryError> {
        let commit = self.find_commit(to)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut checkout))
            .map_err(classify)?;
        self.move_branch(commit.id(), &format!("reset to {}", to.short()))
    }
}

fn check_supported(url: &str) -> Result<(), RepositoryError> {
    let https = url.starts_with("https://") || url.starts_with("http://");
    if https && !cfg!(feature = "https") {
        return Err(RepositoryError::UnsupportedRemote(format!(
            "{url} (rebuild with the `https` feature)"
        )));
    }
    if url.starts_with("ssh://") || (url.contains('@') && url.contains(':') && !https) {
        return Err(RepositoryError::UnsupportedRemote(format!(
            "{url} (ssh remotes are not supported, use https with a token)"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_remotes_rejected() {
        assert!(matches!(
            check_supported("git@github.com:org/repo.git"),
            Err(RepositoryError::UnsupportedRemote(_))
        ));
        assert!(check_supported("/srv/git/vault.git").is_ok());
        assert!(check_supported("file:///srv/git/vault.git").is_ok());
    }

    #[test]
    fn test_debug_hides_token() {
        let config = GitConfig {
            token: Some("ghp_secret".to_string()),
            ..Default::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("ghp_secret"));
    }
}
