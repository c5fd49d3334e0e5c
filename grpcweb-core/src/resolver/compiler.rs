//! # Descriptor Compilers
//!
//! Strategies turning a `.proto` file into an encoded `FileDescriptorSet` (imports included).
//!
//! * [`ProtocCompiler`] shells out to `protoc`.
//! * [`ProtoxCompiler`] compiles in-process with the pure-Rust `protox` compiler.
//!
//! Compilation is async so callers can bound it with a timeout: dropping the future of a
//! [`ProtocCompiler`] kills the `protoc` process.
use async_trait::async_trait;
use prost::Message;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Failure of a compiler run.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CompileError {
    /// What the compiler reported. For `protoc` this is its stderr, verbatim.
    pub message: String,
    /// Exit code of the compiler process, when one ran and exited.
    pub exit_code: Option<i32>,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: None,
        }
    }

    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }
}

/// Produces a binary `FileDescriptorSet` for `proto_file`, resolving imports against
/// `include_dir` only.
///
/// Implementations must stop their work when the returned future is dropped.
#[async_trait]
pub trait DescriptorCompiler: Debug + Send + Sync + 'static {
    async fn compile(&self, proto_file: &Path, include_dir: &Path)
    -> Result<Vec<u8>, CompileError>;
}

/// Runs `protoc --descriptor_set_out=<tmp> --include_imports -I <dir> <file>` inside `<dir>`.
#[derive(Debug, Clone)]
pub struct ProtocCompiler {
    program: PathBuf,
}

impl ProtocCompiler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Uses the `PROTOC` environment variable when set, `protoc` from `PATH` otherwise.
    pub fn from_env() -> Self {
        let program = std::env::var_os("PROTOC")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("protoc"));
        Self::new(program)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for ProtocCompiler {
    fn default() -> Self {
        Self::from_env()
    }
}

#[async_trait]
impl DescriptorCompiler for ProtocCompiler {
    async fn compile(
        &self,
        proto_file: &Path,
        include_dir: &Path,
    ) -> Result<Vec<u8>, CompileError> {
        let descriptor_out = tempfile::Builder::new()
            .prefix("desc")
            .suffix(".pb")
            .tempfile()
            .map_err(|e| CompileError::new(format!("failed to create temporary file: {e}")))?;

        let mut descriptor_arg = std::ffi::OsString::from("--descriptor_set_out=");
        descriptor_arg.push(descriptor_out.path());

        debug!(
            program = %self.program.display(),
            proto = %proto_file.display(),
            out = %descriptor_out.path().display(),
            "running protoc"
        );

        let output = Command::new(&self.program)
            .arg(descriptor_arg)
            .arg("--include_imports")
            .arg("-I")
            .arg(include_dir)
            .arg(proto_file)
            .current_dir(include_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                CompileError::new(format!(
                    "failed to run '{}': {e}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            debug!(status = %output.status, "protoc failed");
            return Err(
                CompileError::new(String::from_utf8_lossy(&output.stderr))
                    .with_exit_code(output.status.code()),
            );
        }

        tokio::fs::read(descriptor_out.path())
            .await
            .map_err(|e| CompileError::new(format!("failed to read descriptor set: {e}")))
    }
}

/// Compiles with `protox`, no external binary required.
///
/// The work runs on the blocking pool; it finishes even if the caller stops waiting.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtoxCompiler;

#[async_trait]
impl DescriptorCompiler for ProtoxCompiler {
    async fn compile(
        &self,
        proto_file: &Path,
        include_dir: &Path,
    ) -> Result<Vec<u8>, CompileError> {
        debug!(proto = %proto_file.display(), "compiling with protox");

        let file = proto_file.to_path_buf();
        let dir = include_dir.to_path_buf();

        let file_descriptor_set = tokio::task::spawn_blocking(move || protox::compile([file], [dir]))
            .await
            .map_err(|e| CompileError::new(e.to_string()))?
            .map_err(|e| CompileError::new(e.to_string()))?;

        Ok(file_descriptor_set.encode_to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::FileDescriptorSet;

    #[tokio::test]
    async fn protox_compiles_with_imports() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("common.proto"),
            "syntax = \"proto3\"; package common; message Id { string value = 1; }",
        )
        .unwrap();
        let main = dir.path().join("main.proto");
        std::fs::write(
            &main,
            "syntax = \"proto3\"; package main; import \"common.proto\";\n\
             message Req { common.Id id = 1; }\n\
             service S { rpc Get (Req) returns (common.Id); }",
        )
        .unwrap();

        let bytes = ProtoxCompiler.compile(&main, dir.path()).await.unwrap();
        let set = FileDescriptorSet::decode(bytes.as_slice()).unwrap();
        let names: Vec<_> = set.file.iter().map(|f| f.name()).collect();

        assert!(names.contains(&"common.proto"));
        assert!(names.contains(&"main.proto"));
    }

    #[tokio::test]
    async fn protox_reports_syntax_errors() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.proto");
        std::fs::write(&broken, "syntax = \"proto3\"; message {").unwrap();

        assert!(ProtoxCompiler.compile(&broken, dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn protoc_missing_binary_is_a_compile_error() {
        let dir = tempfile::tempdir().unwrap();
        let proto = dir.path().join("a.proto");
        std::fs::write(&proto, "syntax = \"proto3\";").unwrap();

        let compiler = ProtocCompiler::new("/definitely/not/a/protoc");
        let err = compiler.compile(&proto, dir.path()).await.unwrap_err();

        assert!(err.message.contains("failed to run"), "{err}");
        assert_eq!(err.exit_code, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn protoc_stderr_is_kept_verbatim() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let proto = dir.path().join("a.proto");
        std::fs::write(&proto, "syntax = \"proto3\";").unwrap();

        let script = dir.path().join("fake-protoc.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nprintf 'a.proto:1:1: Expected \"message\".\\n\\n' >&2\nexit 3\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = ProtocCompiler::new(&script)
            .compile(&proto, dir.path())
            .await
            .unwrap_err();

        assert_eq!(err.message, "a.proto:1:1: Expected \"message\".\n\n");
        assert_eq!(err.exit_code, Some(3));
    }
}
