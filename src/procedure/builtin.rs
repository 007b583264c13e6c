//! Built-in Procedures
//!
//! Procedures every registry created with
//! [`ProcedureRegistry::with_builtins`](super::ProcedureRegistry::with_builtins)
//! provides:
//!
//! | Name                    | Arguments                      | Outputs    |
//! |-------------------------|--------------------------------|------------|
//! | `action/echo`           | `message`                      | `message`  |
//! | `action/write`          | `filename` (required), `content` | `filepath` |
//! | `action/copy-local-dir` | `src`, `dest` (both required)  | `path`     |
//!
//! `filename` and `dest` always name a location inside the job root. A
//! leading `/` is dropped and `..` components are rejected, so the cleanup
//! these steps return can never remove anything outside the root.

use std::fs;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::action::ProcedureArgs;
use crate::error::{ActionError, Result};
use crate::execution::{Cleanup, RunnableStep, StepContext};

use super::argument::Argument;
use super::registry::ProcedureRegistry;

pub const ECHO: &str = "action/echo";
pub const WRITE: &str = "action/write";
pub const COPY_LOCAL_DIR: &str = "action/copy-local-dir";

/// Registers every built-in procedure on `registry`.
pub fn register_builtins(registry: &ProcedureRegistry) -> Result<()> {
    registry.register(ECHO, build_echo)?;
    registry.register(WRITE, build_write)?;
    registry.register(COPY_LOCAL_DIR, build_copy_local_dir)?;
    Ok(())
}

/// Reads an argument that must be present and non-empty.
fn required<'a>(args: &'a ProcedureArgs, key: &str) -> Result<&'a str> {
    match args.get(key) {
        Some(value) if !value.is_empty() => Ok(value.as_str()),
        _ => Err(ActionError::required(key)),
    }
}

fn optional(args: &ProcedureArgs, key: &str) -> String {
    args.get(key).cloned().unwrap_or_default()
}

/// Joins `raw` onto `root`, keeping the result strictly inside `root`.
fn within_root(root: &Path, raw: &str) -> Result<PathBuf> {
    let mut path = root.to_path_buf();

    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
            Component::ParentDir => return Err(ActionError::PathOutsideRoot(raw.to_string())),
        }
    }

    if path == root {
        return Err(ActionError::PathOutsideRoot(raw.to_string()));
    }
    Ok(path)
}

// ============================================================================
// action/echo
// ============================================================================

/// Prints a message.
#[derive(Debug)]
pub struct EchoStep {
    message: Argument<String>,
}

fn build_echo(args: &ProcedureArgs) -> Result<Box<dyn RunnableStep>> {
    Ok(Box::new(EchoStep {
        message: Argument::string(optional(args, "message")),
    }))
}

#[async_trait]
impl RunnableStep for EchoStep {
    async fn run(
        &self,
        _cancel: &CancellationToken,
        sc: &mut StepContext<'_>,
    ) -> Result<Option<Cleanup>> {
        let message = self.message.value(|raw| sc.expand_string(raw));
        sc.writers().write_stdout(format!("{}\n", message).as_bytes());
        info!("[{}] {}", sc.id(), message);

        sc.set_output("message", message);
        Ok(None)
    }
}

// ============================================================================
// action/write
// ============================================================================

/// Writes a file into the job root.
#[derive(Debug)]
pub struct WriteStep {
    filename: Argument<String>,
    content: Argument<String>,
}

fn build_write(args: &ProcedureArgs) -> Result<Box<dyn RunnableStep>> {
    Ok(Box::new(WriteStep {
        filename: Argument::string(required(args, "filename")?),
        content: Argument::string(optional(args, "content")),
    }))
}

#[async_trait]
impl RunnableStep for WriteStep {
    async fn run(
        &self,
        _cancel: &CancellationToken,
        sc: &mut StepContext<'_>,
    ) -> Result<Option<Cleanup>> {
        let path = within_root(&sc.root()?, &self.filename.value(|raw| sc.expand_string(raw)))?;
        let content = self.content.value(|raw| sc.expand_string(raw));

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        debug!("Wrote file: {}", path.display());

        sc.set_output("filepath", path.to_string_lossy().into_owned());
        Ok(Some(Cleanup::RemoveFile(path)))
    }
}

// ============================================================================
// action/copy-local-dir
// ============================================================================

/// Copies a local directory tree into the job root.
#[derive(Debug)]
pub struct CopyLocalDirStep {
    src: Argument<String>,
    dest: Argument<String>,
}

fn build_copy_local_dir(args: &ProcedureArgs) -> Result<Box<dyn RunnableStep>> {
    Ok(Box::new(CopyLocalDirStep {
        src: Argument::string(required(args, "src")?),
        dest: Argument::string(required(args, "dest")?),
    }))
}

#[async_trait]
impl RunnableStep for CopyLocalDirStep {
    async fn run(
        &self,
        _cancel: &CancellationToken,
        sc: &mut StepContext<'_>,
    ) -> Result<Option<Cleanup>> {
        let src = PathBuf::from(self.src.value(|raw| sc.expand_string(raw)));
        let dest = within_root(&sc.root()?, &self.dest.value(|raw| sc.expand_string(raw)))?;
        info!("Copying {} to {}", src.display(), dest.display());

        let target = dest.clone();
        tokio::task::spawn_blocking(move || copy_dir(&src, &target))
            .await
            .map_err(|e| ActionError::TaskFailed(e.to_string()))??;

        sc.set_output("path", dest.to_string_lossy().into_owned());
        Ok(Some(Cleanup::RemoveDir(dest)))
    }
}

/// Recursively copies `src` into `dest`, creating `dest` if needed.
///
/// Symbolic links are recreated as links, never followed.
fn copy_dir(src: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            copy_link(&entry.path(), &target)?;
        } else if file_type.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_link(link: &Path, target: &Path) -> Result<()> {
    std::os::unix::fs::symlink(fs::read_link(link)?, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_link(link: &Path, target: &Path) -> Result<()> {
    if fs::metadata(link)?.is_dir() {
        copy_dir(link, target)
    } else {
        fs::copy(link, target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::writer::tests::Buffer;
    use crate::execution::writer::{shared, Writers};
    use crate::execution::{ActionScope, JobContext};
    use crate::variables::Variables;
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn args(pairs: &[(&str, &str)]) -> ProcedureArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn job_context(vars: &[(&str, &str)]) -> JobContext {
        JobContext::new(
            "job",
            args(vars),
            Arc::new(ActionScope::new("action", Variables::new())),
        )
    }

    fn registry() -> ProcedureRegistry {
        ProcedureRegistry::with_builtins().unwrap()
    }

    #[tokio::test]
    async fn test_echo_sets_message_output() {
        let step = registry()
            .resolve(ECHO, &args(&[("message", "hello ${WHO}")]))
            .unwrap();

        let mut job = job_context(&[("WHO", "world")]);
        let empty = Variables::new();
        let mut sc = StepContext::new("say", &empty, &mut job);

        let cleanup = step.run(&CancellationToken::new(), &mut sc).await.unwrap();
        assert!(cleanup.is_none());
        assert_eq!(sc.get_this_output("message"), Some(&Value::from("hello world")));
    }

    #[tokio::test]
    async fn test_echo_prints_to_stdout_writer() {
        let out = Buffer::default();
        let action = ActionScope::new("action", Variables::new())
            .with_writers(Writers::new(shared(out.clone()), shared(Buffer::default())));
        let mut job = JobContext::new("job", Variables::new(), Arc::new(action));
        let empty = Variables::new();
        let mut sc = StepContext::new("say", &empty, &mut job);

        registry()
            .resolve(ECHO, &args(&[("message", "first")]))
            .unwrap()
            .run(&CancellationToken::new(), &mut sc)
            .await
            .unwrap();

        assert_eq!(out.contents(), "first\n");
    }

    #[test]
    fn test_within_root() {
        let root = Path::new("/tmp/actionflow-root");

        assert_eq!(within_root(root, "a/b.txt").unwrap(), root.join("a/b.txt"));
        assert_eq!(within_root(root, "/etc/passwd").unwrap(), root.join("etc/passwd"));
        assert_eq!(within_root(root, "./x/./y").unwrap(), root.join("x/y"));

        for raw in ["..", "../x", "a/../../x", "a/..", "", "/", "."] {
            assert!(
                matches!(within_root(root, raw), Err(ActionError::PathOutsideRoot(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_write_absolute_filename_stays_in_root() {
        let outside = tempdir().unwrap();
        let victim = outside.path().join("keep.txt");
        fs::write(&victim, "original").unwrap();

        let filename = victim.to_string_lossy().into_owned();
        let step = registry()
            .resolve(WRITE, &args(&[("filename", filename.as_str()), ("content", "new")]))
            .unwrap();

        let mut job = job_context(&[]);
        let empty = Variables::new();
        let mut sc = StepContext::new("write", &empty, &mut job);

        let cleanup = step
            .run(&CancellationToken::new(), &mut sc)
            .await
            .unwrap()
            .unwrap();

        let root = sc.root().unwrap();
        let written = PathBuf::from(sc.get_this_output("filepath").unwrap().as_str().unwrap());
        assert!(written.starts_with(&root));
        assert_eq!(fs::read_to_string(&written).unwrap(), "new");

        cleanup.run().unwrap();
        assert!(!written.exists());
        assert_eq!(fs::read_to_string(&victim).unwrap(), "original");
    }

    #[tokio::test]
    async fn test_parent_components_are_rejected() {
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("a.txt"), "a").unwrap();
        let src = outside.path().to_string_lossy().into_owned();

        let mut job = job_context(&[]);
        let empty = Variables::new();
        let mut sc = StepContext::new("escape", &empty, &mut job);

        let write = registry()
            .resolve(WRITE, &args(&[("filename", "../escaped.txt"), ("content", "x")]))
            .unwrap();
        let err = write.run(&CancellationToken::new(), &mut sc).await.unwrap_err();
        assert!(matches!(err, ActionError::PathOutsideRoot(ref raw) if raw == "../escaped.txt"));

        let copy = registry()
            .resolve(COPY_LOCAL_DIR, &args(&[("src", src.as_str()), ("dest", "..")]))
            .unwrap();
        let err = copy.run(&CancellationToken::new(), &mut sc).await.unwrap_err();
        assert!(matches!(err, ActionError::PathOutsideRoot(_)));

        let root = sc.root().unwrap();
        assert!(!root.parent().unwrap().join("escaped.txt").exists());
        assert!(!root.parent().unwrap().join("a.txt").exists());
        assert!(outside.path().join("a.txt").exists());
    }

    #[test]
    fn test_write_requires_filename() {
        let err = registry()
            .resolve(WRITE, &args(&[("content", "x")]))
            .unwrap_err();
        assert!(matches!(err.root_cause(), ActionError::RequiredArgument(key) if key == "filename"));

        let err = registry()
            .resolve(WRITE, &args(&[("filename", "")]))
            .unwrap_err();
        assert!(matches!(err.root_cause(), ActionError::RequiredArgument(_)));
    }

    #[tokio::test]
    async fn test_write_creates_file_and_cleanup() {
        let step = registry()
            .resolve(
                WRITE,
                &args(&[("filename", "${NAME}.txt"), ("content", "hello $WHO")]),
            )
            .unwrap();

        let mut job = job_context(&[("NAME", "greeting"), ("WHO", "world")]);
        let empty = Variables::new();
        let mut sc = StepContext::new("write", &empty, &mut job);

        let cleanup = step
            .run(&CancellationToken::new(), &mut sc)
            .await
            .unwrap()
            .unwrap();

        let path = sc.root().unwrap().join("greeting.txt");
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello world");
        assert_eq!(
            sc.get_this_output("filepath"),
            Some(&Value::from(path.to_string_lossy().into_owned()))
        );

        cleanup.run().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_copy_requires_src_and_dest() {
        let err = registry()
            .resolve(COPY_LOCAL_DIR, &args(&[("dest", "out")]))
            .unwrap_err();
        assert!(matches!(err.root_cause(), ActionError::RequiredArgument(key) if key == "src"));

        let err = registry()
            .resolve(COPY_LOCAL_DIR, &args(&[("src", "in")]))
            .unwrap_err();
        assert!(matches!(err.root_cause(), ActionError::RequiredArgument(key) if key == "dest"));
    }

    #[tokio::test]
    async fn test_copy_local_dir_recursive() {
        let source = tempdir().unwrap();
        fs::create_dir_all(source.path().join("sub")).unwrap();
        fs::write(source.path().join("a.txt"), "a").unwrap();
        fs::write(source.path().join("sub/b.txt"), "b").unwrap();

        let step = registry()
            .resolve(
                COPY_LOCAL_DIR,
                &args(&[("src", "${SRC}"), ("dest", "copy")]),
            )
            .unwrap();

        let src = source.path().to_string_lossy().into_owned();
        let mut job = job_context(&[("SRC", src.as_str())]);
        let empty = Variables::new();
        let mut sc = StepContext::new("copy", &empty, &mut job);

        let cleanup = step
            .run(&CancellationToken::new(), &mut sc)
            .await
            .unwrap()
            .unwrap();

        let dest = sc.root().unwrap().join("copy");
        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "a");
        assert_eq!(fs::read_to_string(dest.join("sub/b.txt")).unwrap(), "b");

        cleanup.run().unwrap();
        assert!(!dest.exists());
        assert!(source.path().join("a.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_copy_local_dir_keeps_symlinks() {
        let source = tempdir().unwrap();
        let linked = tempdir().unwrap();
        fs::write(linked.path().join("shared.txt"), "shared").unwrap();
        fs::write(source.path().join("real.txt"), "real").unwrap();
        std::os::unix::fs::symlink(linked.path(), source.path().join("dir-link")).unwrap();
        std::os::unix::fs::symlink("real.txt", source.path().join("file-link")).unwrap();

        let src = source.path().to_string_lossy().into_owned();
        let step = registry()
            .resolve(COPY_LOCAL_DIR, &args(&[("src", src.as_str()), ("dest", "copy")]))
            .unwrap();

        let mut job = job_context(&[]);
        let empty = Variables::new();
        let mut sc = StepContext::new("copy", &empty, &mut job);

        let cleanup = step
            .run(&CancellationToken::new(), &mut sc)
            .await
            .unwrap()
            .unwrap();

        let dest = sc.root().unwrap().join("copy");
        let dir_link = dest.join("dir-link");
        assert!(fs::symlink_metadata(&dir_link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&dir_link).unwrap(), linked.path());
        assert_eq!(
            fs::read_link(dest.join("file-link")).unwrap(),
            PathBuf::from("real.txt")
        );
        assert_eq!(fs::read_to_string(dest.join("file-link")).unwrap(), "real");

        cleanup.run().unwrap();
        assert!(!dest.exists());
        assert!(linked.path().join("shared.txt").exists());
    }

    #[tokio::test]
    async fn test_copy_missing_source_fails() {
        let step = registry()
            .resolve(
                COPY_LOCAL_DIR,
                &args(&[("src", "/definitely/not/here"), ("dest", "copy")]),
            )
            .unwrap();

        let mut job = job_context(&[]);
        let empty = Variables::new();
        let mut sc = StepContext::new("copy", &empty, &mut job);

        let err = step.run(&CancellationToken::new(), &mut sc).await.unwrap_err();
        assert!(matches!(err, ActionError::Io(_)));
    }
}
