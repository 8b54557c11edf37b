//! Sandboxed evaluation environments.
//!
//! An [`Environment`] owns a script engine restricted to the standard
//! string/array/map/math packages plus a few path helpers, a binding scope,
//! the script functions declared so far, and two reserved fields: the
//! current file and its directory. Module imports resolve to nothing; the
//! only way to reach a file is `include()`, which is installed lazily on
//! first evaluation, or eagerly for the child environments created by text
//! includes.

use std::path::{Path, PathBuf};

use parley_core::{normalize_path, resolve_path, FileAccess, IncludePart};
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST};
use tracing::debug;

use crate::evaluate::Bindings;
use crate::include::{IncludeOptions, IncludeResolver};

/// Script-visible name of the current file path.
pub const FILENAME_BINDING: &str = "__filename";
/// Script-visible name of the current directory.
pub const DIRNAME_BINDING: &str = "__dirname";

/// The chain of text includes currently being resolved, outermost first.
///
/// Extending produces a new stack; an existing stack is never modified, so
/// sibling includes never observe each other's entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeStack(Vec<PathBuf>);

impl IncludeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stack holding just `file`, or an empty one.
    pub fn seeded(file: Option<&Path>) -> Self {
        IncludeStack(file.map(Path::to_path_buf).into_iter().collect())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.0.iter().any(|entry| entry == path)
    }

    /// A copy of this stack with `path` appended.
    pub fn extended(&self, path: PathBuf) -> Self {
        let mut entries = self.0.clone();
        entries.push(path);
        IncludeStack(entries)
    }

    /// Display form of the stack followed by `closing`, for cycle reports.
    pub fn chain_with(&self, closing: &Path) -> Vec<String> {
        self.0
            .iter()
            .map(|p| p.display().to_string())
            .chain(std::iter::once(closing.display().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.0
    }
}

/// A name-binding scope plus the engine that evaluates code inside it.
pub struct Environment {
    pub(crate) engine: Engine,
    pub(crate) scope: Scope<'static>,
    /// Function definitions only; merged into every evaluated program.
    pub(crate) functions: AST,
    file_path: Option<PathBuf>,
    dir: Option<PathBuf>,
    files: FileAccess,
    include_installed: bool,
}

/// A fresh environment with no current file. Each call builds its own
/// engine and scope.
pub fn create_environment(files: FileAccess) -> Environment {
    Environment::new(files)
}

impl Environment {
    pub fn new(files: FileAccess) -> Self {
        Environment {
            engine: sandbox_engine(),
            scope: Scope::new(),
            functions: AST::empty(),
            file_path: None,
            dir: None,
            files,
            include_installed: false,
        }
    }

    /// A fresh environment whose reserved fields point at `path`. Relative
    /// paths are made absolute against the working directory.
    pub fn for_file(path: &Path, files: FileAccess) -> Self {
        let mut env = Environment::new(files);
        env.set_file(absolutize(path));
        env
    }

    /// The environment for a text include of `path`: reserved fields only,
    /// with `include()` bound to `stack`.
    pub(crate) fn child(path: PathBuf, stack: IncludeStack, files: FileAccess) -> Self {
        let mut env = Environment::new(files);
        env.set_file(path);
        env.install_include(stack);
        env
    }

    fn set_file(&mut self, path: PathBuf) {
        let dir = path.parent().map(Path::to_path_buf);
        self.scope
            .push_constant(FILENAME_BINDING, path.display().to_string());
        if let Some(dir) = &dir {
            self.scope
                .push_constant(DIRNAME_BINDING, dir.display().to_string());
        }
        self.file_path = Some(path);
        self.dir = dir;
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn files(&self) -> &FileAccess {
        &self.files
    }

    /// Name used for this environment in error messages.
    pub fn display_name(&self) -> String {
        match &self.file_path {
            Some(path) => path.display().to_string(),
            None => "<inline>".to_string(),
        }
    }

    /// Bind `name`, shadowing any earlier binding of the same name.
    pub fn set(&mut self, name: &str, value: impl Into<Dynamic>) {
        self.scope.push_dynamic(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<Dynamic> {
        self.scope.get_value::<Dynamic>(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scope.contains(name)
    }

    /// Bind every entry of `bindings`, e.g. the outputs of a frontmatter
    /// block.
    pub fn seed(&mut self, bindings: &Bindings) {
        for (name, value) in bindings {
            self.scope.push_dynamic(name.clone(), value.clone());
        }
    }

    /// Make the functions defined in `functions` callable here. Later
    /// definitions replace earlier ones with the same name and arity.
    pub fn seed_functions(&mut self, functions: &AST) {
        self.functions.combine(functions.clone_functions_only());
    }

    /// Every script function declared in this environment so far.
    pub fn functions(&self) -> &AST {
        &self.functions
    }

    pub fn binding_count(&self) -> usize {
        self.scope.len()
    }

    pub fn has_include(&self) -> bool {
        self.include_installed
    }

    /// Install `include()` if it is not there yet, rooted at this
    /// environment's own file.
    pub(crate) fn ensure_include(&mut self) {
        if !self.include_installed {
            let stack = IncludeStack::seeded(self.file_path.as_deref());
            self.install_include(stack);
        }
    }

    fn install_include(&mut self, stack: IncludeStack) {
        debug!(file = %self.display_name(), depth = stack.len(), "installing include()");
        let resolver = IncludeResolver::new(self.dir.clone(), stack, self.files.clone());
        let plain = resolver.clone();
        self.engine
            .register_fn("include", move |path: &str| -> Result<Dynamic, Box<EvalAltResult>> {
                plain.call(path, IncludeOptions::default())
            });
        self.engine.register_fn(
            "include",
            move |path: &str, options: rhai::Map| -> Result<Dynamic, Box<EvalAltResult>> {
                let options = IncludeOptions::from_map(&options)?;
                resolver.call(path, options)
            },
        );
        self.include_installed = true;
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("file_path", &self.file_path)
            .field("bindings", &self.scope.len())
            .field("functions", &self.functions.iter_functions().count())
            .field("include_installed", &self.include_installed)
            .finish()
    }
}

/// Engine with the curated capability set. No filesystem or process
/// access is registered, `import` cannot load modules and `eval` is
/// switched off.
fn sandbox_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_module_resolver(DummyModuleResolver::new());
    engine.disable_symbol("eval");
    engine.on_print(|text| debug!(target: "parley::script", "{}", text));
    engine.on_debug(|text, source, pos| {
        debug!(target: "parley::script", source = source.unwrap_or(""), position = %pos, "{}", text)
    });

    engine
        .register_fn("dirname", |path: &str| -> String {
            Path::new(path)
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        })
        .register_fn("basename", |path: &str| -> String {
            Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .register_fn("join_path", |base: &str, fragment: &str| -> String {
            resolve_path(Path::new(base), fragment).display().to_string()
        });

    engine
        .register_type_with_name::<IncludePart>("IncludePart")
        .register_fn("to_string", |part: &mut IncludePart| part.to_string())
        .register_fn("to_debug", |part: &mut IncludePart| format!("{:?}", part));

    engine
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize_path(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize_path(&cwd.join(path)),
        Err(_) => normalize_path(path),
    }
}
