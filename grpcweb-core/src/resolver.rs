//! # Descriptor Resolver
//!
//! Turns a `.proto` file path into a [`ProtoSchema`].
//!
//! ## How it works
//!
//! 1. The proto text is read, stripped of comments and scanned for its `package` and its
//!    `service`/`rpc` declarations (see [`textual`]).
//! 2. A [`DescriptorCompiler`] compiles the file (its directory is the only include path,
//!    imports included) into a binary `FileDescriptorSet`. The wait is bounded, and a
//!    compiler that overruns it is stopped.
//! 3. The files of the set are loaded into a `DescriptorPool` strictly after their
//!    dependencies, whatever order the compiler emitted them in.
//! 4. The descriptor of the input file is located by exact name, or by path suffix since
//!    compilers may report names relative to their include path, and its services become
//!    the schema.
//!
//! [`DescriptorResolver::resolve`] only ever returns compiled schemas. Discovery surfaces
//! can use [`DescriptorResolver::discover`], which degrades to the names found in step 1
//! when compilation fails.
pub mod compiler;
mod textual;

pub use compiler::{CompileError, DescriptorCompiler, ProtocCompiler, ProtoxCompiler};

use crate::schema::{ProtoSchema, ServiceSchema};
use prost::Message;
use prost_reflect::{DescriptorPool, FileDescriptor};
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("Proto file not found: '{}'", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read proto file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Descriptor compilation failed for '{}' (exit code {}): {stderr}",
        path.display(),
        exit_code.map_or_else(|| "none".to_string(), |c| c.to_string())
    )]
    CompileFailed {
        path: PathBuf,
        /// Compiler output, unmodified.
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("Descriptor compilation for '{}' did not finish within {timeout:?}", path.display())]
    CompileTimedOut { path: PathBuf, timeout: Duration },

    #[error("Failed to decode file descriptor set: '{0}'")]
    InvalidDescriptorSet(#[from] prost::DecodeError),

    #[error("Failed to load descriptor of '{file}': '{source}'")]
    InvalidDescriptor {
        file: String,
        #[source]
        source: prost_reflect::DescriptorError,
    },

    #[error("Resolution failed: {0}")]
    ResolutionFailed(String),
}

impl DescriptorError {
    /// Whether a name-only schema can still be offered in place of a compiled one.
    pub fn is_degradable(&self) -> bool {
        !matches!(self, Self::NotFound(_) | Self::Io { .. })
    }
}

/// Resolves proto files into schemas using a pluggable [`DescriptorCompiler`].
#[derive(Debug, Clone)]
pub struct DescriptorResolver {
    compiler: Arc<dyn DescriptorCompiler>,
    compile_timeout: Duration,
}

impl DescriptorResolver {
    pub fn new(compiler: impl DescriptorCompiler) -> Self {
        Self {
            compiler: Arc::new(compiler),
            compile_timeout: DEFAULT_COMPILE_TIMEOUT,
        }
    }

    /// Bounds how long a single compiler run may take.
    pub fn with_compile_timeout(mut self, timeout: Duration) -> Self {
        self.compile_timeout = timeout;
        self
    }

    pub fn compile_timeout(&self) -> Duration {
        self.compile_timeout
    }

    /// Resolves `path` into a compiled schema.
    ///
    /// # Returns
    ///
    /// * `Ok(ProtoSchema)` - A schema whose methods all carry message descriptors.
    /// * `Err(DescriptorError)` - The file is missing, the compiler failed or timed out, or
    ///   the descriptor of the file could not be located in the compiled set.
    pub async fn resolve(&self, path: &Path) -> Result<ProtoSchema, DescriptorError> {
        let source = ProtoSource::read(path).await?;
        self.compile(&source).await
    }

    /// Like [`Self::resolve`], but falls back to a degraded, name-only schema when the
    /// compilation step fails. A missing or unreadable file is still an error.
    pub async fn discover(&self, path: &Path) -> Result<ProtoSchema, DescriptorError> {
        let source = ProtoSource::read(path).await?;

        match self.compile(&source).await {
            Ok(schema) => Ok(schema),
            Err(err) if err.is_degradable() => {
                warn!(
                    proto = %source.file.display(),
                    error = %err,
                    "descriptor compilation failed, falling back to a name-only schema"
                );
                Ok(source.into_degraded())
            }
            Err(err) => Err(err),
        }
    }

    /// Builds the name-only schema of `path` without running the compiler.
    pub async fn scan(&self, path: &Path) -> Result<ProtoSchema, DescriptorError> {
        Ok(ProtoSource::read(path).await?.into_degraded())
    }

    async fn compile(&self, source: &ProtoSource) -> Result<ProtoSchema, DescriptorError> {
        let run = self.compiler.compile(&source.file, &source.dir);

        let bytes = match tokio::time::timeout(self.compile_timeout, run).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(err)) => {
                return Err(DescriptorError::CompileFailed {
                    path: source.file.clone(),
                    stderr: err.message,
                    exit_code: err.exit_code,
                });
            }
            Err(_) => {
                warn!(
                    proto = %source.file.display(),
                    timeout = ?self.compile_timeout,
                    "descriptor compiler timed out"
                );
                return Err(DescriptorError::CompileTimedOut {
                    path: source.file.clone(),
                    timeout: self.compile_timeout,
                });
            }
        };

        let schema = load_schema(source.file.clone(), &bytes, &source.file_name())?;

        info!(
            proto = %source.file.display(),
            package = schema.package(),
            services = schema.services().len(),
            "resolved proto schema"
        );

        Ok(schema)
    }
}

impl ProtoSchema {
    /// Builds a compiled schema from an already encoded `FileDescriptorSet`, selecting the
    /// services of the file called `file_name`.
    pub fn from_descriptor_set(bytes: &[u8], file_name: &str) -> Result<Self, DescriptorError> {
        load_schema(PathBuf::from(file_name), bytes, file_name)
    }
}

/// The proto file as read from disk, plus what the textual scan recovered from it.
struct ProtoSource {
    file: PathBuf,
    dir: PathBuf,
    package: String,
    services: Vec<ServiceSchema>,
}

impl ProtoSource {
    async fn read(path: &Path) -> Result<Self, DescriptorError> {
        let file = std::path::absolute(path).map_err(|source| DescriptorError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let text = tokio::fs::read_to_string(&file)
            .await
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => DescriptorError::NotFound(file.clone()),
                _ => DescriptorError::Io {
                    path: file.clone(),
                    source,
                },
            })?;

        let dir = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let cleaned = textual::strip_comments(&text);
        let package = textual::package_name(&cleaned);
        let services = textual::services(&cleaned, &package);

        debug!(
            proto = %file.display(),
            package = %package,
            services = services.len(),
            "scanned proto source"
        );

        Ok(Self {
            file,
            dir,
            package,
            services,
        })
    }

    fn file_name(&self) -> String {
        self.file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn into_degraded(self) -> ProtoSchema {
        ProtoSchema::degraded(self.file, self.package, self.services)
    }
}

fn load_schema(
    source: PathBuf,
    bytes: &[u8],
    file_name: &str,
) -> Result<ProtoSchema, DescriptorError> {
    let fd_set = FileDescriptorSet::decode(bytes)?;

    let mut pool = DescriptorPool::new();
    for file in dependency_order(fd_set.file)? {
        let name = file.name().to_string();
        pool.add_file_descriptor_proto(file)
            .map_err(|source| DescriptorError::InvalidDescriptor { file: name, source })?;
    }

    let target = find_file(&pool, file_name).ok_or_else(|| {
        DescriptorError::ResolutionFailed(format!(
            "descriptor for '{file_name}' not found in the compiled set"
        ))
    })?;

    Ok(ProtoSchema::compiled(
        source,
        target.package_name().to_string(),
        target.services(),
        pool,
    ))
}

/// Orders files so that each one comes after every file it depends on.
///
/// Files are taken in passes: a pass moves every file whose dependencies are already
/// ordered. A pass that moves nothing means a dependency is missing from the set (or
/// the set is cyclic).
fn dependency_order(
    files: Vec<FileDescriptorProto>,
) -> Result<Vec<FileDescriptorProto>, DescriptorError> {
    let mut ordered = Vec::with_capacity(files.len());
    let mut resolved = HashSet::new();
    let mut pending = files;

    while !pending.is_empty() {
        let (ready, blocked): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|file| file.dependency.iter().all(|dep| resolved.contains(dep)));

        if ready.is_empty() {
            let names: Vec<_> = blocked.iter().map(|f| f.name()).collect();
            return Err(DescriptorError::ResolutionFailed(format!(
                "unresolvable dependencies for [{}]",
                names.join(", ")
            )));
        }

        for file in ready {
            resolved.insert(file.name().to_string());
            ordered.push(file);
        }

        pending = blocked;
    }

    Ok(ordered)
}

fn find_file(pool: &DescriptorPool, file_name: &str) -> Option<FileDescriptor> {
    pool.get_file_by_name(file_name).or_else(|| {
        let suffix = format!("/{file_name}");
        pool.files().find(|f| f.name().ends_with(&suffix))
    })
}
