use std::path::{Path, PathBuf};

use git2::{build::RepoBuilder, ApplyLocation, Cred, Diff, FetchOptions, RemoteCallbacks, Repository};

use crate::error::{AppError, Result};

/// Branch names must be non-empty and must not look like an option.
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AppError::Git("Branch name is empty".to_string()));
    }
    if name.starts_with('-') {
        return Err(AppError::Git(format!(
            "Invalid branch name (starts with '-'): {name}"
        )));
    }
    Ok(())
}

/// Build `FetchOptions` that authenticate via credential callback.
/// The token is captured by the closure and never written to disk.
fn make_fetch_options(token: &str) -> FetchOptions<'_> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
        Cred::userpass_plaintext("x-access-token", token)
    });
    let mut opts = FetchOptions::new();
    opts.remote_callbacks(callbacks);
    opts
}

/// Clone a repository into the target directory.
///
/// With a token the URL must be HTTPS; the token is only ever passed through
/// the credential callback. Without a token the clone is anonymous.
pub async fn clone(url: &str, target: &Path, token: Option<&str>) -> Result<()> {
    if token.is_some() && !url.starts_with("https://") {
        return Err(AppError::Git(format!(
            "Expected HTTPS clone URL, got: {url}"
        )));
    }

    let url = url.to_string();
    let target = target.to_path_buf();
    let token = token.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        let mut builder = RepoBuilder::new();
        if let Some(token) = token.as_deref() {
            builder.fetch_options(make_fetch_options(token));
        }
        builder.clone(&url, &target)?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Clone task panicked: {e}")))?
}

/// Apply a unified diff to the working copy at `root`. The diff may only
/// touch `allowed`; anything else is rejected before the working copy changes.
pub async fn apply_patch(root: &Path, patch: &str, allowed: &Path) -> Result<()> {
    let root = root.to_path_buf();
    let patch = patch.as_bytes().to_vec();
    let allowed: PathBuf = allowed
        .components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect();

    tokio::task::spawn_blocking(move || {
        let diff = Diff::from_buffer(&patch)?;
        if diff.deltas().len() == 0 {
            return Err(AppError::Git("Patch contains no file changes".to_string()));
        }

        for delta in diff.deltas() {
            let old_file = delta.old_file();
            let new_file = delta.new_file();
            let stray = [old_file.path(), new_file.path()]
                .into_iter()
                .flatten()
                .find(|p| *p != allowed && *p != Path::new("/dev/null"));
            if let Some(stray) = stray {
                return Err(AppError::Git(format!(
                    "Patch touches {} but only {} may change",
                    stray.display(),
                    allowed.display()
                )));
            }
        }

        let repo = Repository::open(&root)?;
        repo.apply(&diff, ApplyLocation::WorkDir, None)?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Patch task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;
    use std::fs;

    #[test]
    fn test_validate_branch_name_rejects_dash_prefix() {
        assert!(validate_branch_name("-evil").is_err());
        assert!(validate_branch_name("--upload-pack").is_err());
        assert!(validate_branch_name("").is_err());
    }

    #[test]
    fn test_validate_branch_name_accepts_normal() {
        assert!(validate_branch_name("main").is_ok());
        assert!(validate_branch_name("feature/my-branch").is_ok());
    }

    #[tokio::test]
    async fn test_clone_rejects_non_https_with_token() {
        let result = clone(
            "git@github.com:owner/repo.git",
            Path::new("/tmp/test"),
            Some("token"),
        )
        .await;
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Expected HTTPS clone URL"));
    }

    // Repository at `dir` with price_utils.py committed
    fn init_repo(dir: &Path) {
        let repo = Repository::init(dir).unwrap();
        fs::write(dir.join("price_utils.py"), "x = 1\n").unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new("price_utils.py")).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[]).unwrap();
    }

    const PRICE_PATCH: &str = "diff --git a/price_utils.py b/price_utils.py\n\
--- a/price_utils.py\n\
+++ b/price_utils.py\n\
@@ -1 +1 @@\n\
-x = 1\n\
+x = 2\n";

    #[tokio::test]
    async fn test_apply_patch_updates_working_copy() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());

        apply_patch(dir.path(), PRICE_PATCH, Path::new("price_utils.py"))
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("price_utils.py")).unwrap(), "x = 2\n");
    }

    #[tokio::test]
    async fn test_apply_patch_rejects_other_files() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());

        let err = apply_patch(dir.path(), PRICE_PATCH, Path::new("other.py"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("only other.py may change"));
        assert_eq!(fs::read_to_string(dir.path().join("price_utils.py")).unwrap(), "x = 1\n");

        assert!(apply_patch(dir.path(), "not a diff", Path::new("price_utils.py")).await.is_err());
    }

    #[tokio::test]
    async fn test_anonymous_clone_of_local_repo() {
        let origin = tempfile::tempdir().unwrap();
        init_repo(origin.path());

        let dest = tempfile::tempdir().unwrap();
        let target = dest.path().join("checkout");
        clone(origin.path().to_str().unwrap(), &target, None)
            .await
            .unwrap();

        assert!(target.join("price_utils.py").is_file());
    }
}
