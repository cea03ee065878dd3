//! Per-runtime launch target detection.
//!
//! Every detector inspects the filesystem only; none of them spawns
//! anything.

use super::{LaunchPlan, LaunchSource};
use crate::config::DispatchConfig;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;
use walkdir::WalkDir;

/// Fixed name of the compiled service binary.
pub const COMPILED_BINARY: &str = "app-service";

/// Directory under the app root that interpreted dependencies are
/// installed into at build time.
pub const DEPS_DIR: &str = ".deps";

/// Directories that hold installed or generated code, never the app's own.
const SKIPPED_DIRS: [&str; 4] = ["__pycache__", "node_modules", "site-packages", "venv"];

static ENTRY_SYMBOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?::[^=\n]+)?=\s*(FastAPI|Starlette|Flask)\(")
        .expect("entry symbol pattern is valid")
});

/// Web framework an interpreted entry point was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    /// `FastAPI(...)`, served by uvicorn.
    FastApi,
    /// `Starlette(...)`, served by uvicorn.
    Starlette,
    /// `Flask(...)`, served by gunicorn.
    Flask,
}

impl Framework {
    fn from_constructor(name: &str) -> Option<Self> {
        match name {
            "FastAPI" => Some(Self::FastApi),
            "Starlette" => Some(Self::Starlette),
            "Flask" => Some(Self::Flask),
            _ => None,
        }
    }

    /// Whether the app is served by an ASGI server.
    #[must_use]
    pub fn is_asgi(self) -> bool {
        !matches!(self, Self::Flask)
    }
}

/// A detected `module:symbol` entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// Dotted module path.
    pub module: String,
    /// Application object inside the module.
    pub symbol: String,
    /// Framework the object was created with.
    pub framework: Framework,
}

impl EntryPoint {
    /// `module:symbol`, as the servers expect it.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}:{}", self.module, self.symbol)
    }
}

/// Scans Python source for the first framework constructor assignment.
#[must_use]
pub fn find_entry_symbol(source: &str) -> Option<(String, Framework)> {
    ENTRY_SYMBOL.captures_iter(source).find_map(|caps| {
        let framework = Framework::from_constructor(caps.get(2)?.as_str())?;
        Some((caps.get(1)?.as_str().to_string(), framework))
    })
}

/// Dotted module name of a file relative to the app directory.
fn module_name(app_dir: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(app_dir).ok()?.with_extension("");
    let mut parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.last().is_some_and(|p| p == "__init__") {
        parts.pop();
    }
    (!parts.is_empty()).then(|| parts.join("."))
}

fn module_file(app_dir: &Path, module: &str) -> PathBuf {
    let path = app_dir.join(module.replace('.', "/"));
    let file = path.with_extension("py");
    if file.is_file() {
        file
    } else {
        path.join("__init__.py")
    }
}

fn scan_file(app_dir: &Path, file: &Path) -> Option<EntryPoint> {
    let source = std::fs::read_to_string(file).ok()?;
    let (symbol, framework) = find_entry_symbol(&source)?;
    Some(EntryPoint {
        module: module_name(app_dir, file)?,
        symbol,
        framework,
    })
}

fn sorted_files(dir: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
}

/// Application source files in sorted order, skipping hidden and
/// dependency directories.
fn source_files(dir: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
}

fn is_skipped(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || (entry.file_type().is_dir() && SKIPPED_DIRS.contains(&name.as_ref()))
}

/// Finds the interpreted entry point.
///
/// A `module:symbol` hint is taken as is; a bare module hint is scanned
/// first; otherwise every `.py` file outside hidden and dependency
/// directories is scanned in sorted path order and the first match wins.
#[must_use]
pub fn interpreted_entry(app_dir: &Path, hint: Option<&str>) -> Option<EntryPoint> {
    if let Some(hint) = hint {
        if let Some((module, symbol)) = hint.split_once(':') {
            let file = module_file(app_dir, module);
            let framework = std::fs::read_to_string(&file)
                .ok()
                .and_then(|src| find_entry_symbol(&src))
                .filter(|(found, _)| found == symbol)
                .map_or(Framework::FastApi, |(_, framework)| framework);
            return Some(EntryPoint {
                module: module.to_string(),
                symbol: symbol.to_string(),
                framework,
            });
        }
        if let Some(entry) = scan_file(app_dir, &module_file(app_dir, hint)) {
            return Some(entry);
        }
        debug!(hint, "Entry module hint did not match, scanning all modules");
    }

    source_files(app_dir)
        .filter(|p| p.extension().is_some_and(|ext| ext == "py"))
        .find_map(|file| scan_file(app_dir, &file))
}

/// Launch plan for an interpreted entry point.
pub(super) fn interpreted(config: &DispatchConfig) -> Option<LaunchPlan> {
    let entry = interpreted_entry(&config.app_dir, config.module_hint.as_deref())?;
    let port = config.service_port.to_string();
    let (program, args) = if entry.framework.is_asgi() {
        (
            "uvicorn",
            vec![entry.target(), "--host".into(), "0.0.0.0".into(), "--port".into(), port],
        )
    } else {
        (
            "gunicorn",
            vec!["--bind".into(), format!("0.0.0.0:{port}"), entry.target()],
        )
    };
    let mut plan = LaunchPlan::new(LaunchSource::InterpretedEntry, program, args, &config.app_dir);

    let deps = config.app_dir.join(DEPS_DIR);
    if deps.is_dir() {
        plan = plan.with_env("PYTHONPATH", deps.to_string_lossy());
        let search = std::iter::once(deps.join("bin")).chain(config.search_path.iter().cloned());
        match std::env::join_paths(search) {
            Ok(path) => plan = plan.with_env("PATH", path.to_string_lossy()),
            Err(e) => debug!(error = %e, "Cannot extend PATH with dependency scripts"),
        }
    }
    Some(plan)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Launch plan for the compiled service binary.
pub(super) fn compiled(config: &DispatchConfig) -> Option<LaunchPlan> {
    let binary = config
        .search_path
        .iter()
        .map(|dir| dir.join(COMPILED_BINARY))
        .find(|candidate| is_executable(candidate))?;
    Some(LaunchPlan::new(
        LaunchSource::CompiledBinary,
        binary.to_string_lossy(),
        Vec::new(),
        &config.app_dir,
    ))
}

/// Launch plan for a managed-runtime assembly.
pub(super) fn managed(config: &DispatchConfig) -> Option<LaunchPlan> {
    let files: Vec<PathBuf> = sorted_files(&config.app_dir).collect();
    let project = files
        .iter()
        .find(|p| p.extension().is_some_and(|ext| ext == "csproj"))?;
    let stem = project.file_stem()?.to_string_lossy();
    let assembly_name = format!("{stem}.dll");
    let assembly = files
        .iter()
        .find(|p| p.file_name().is_some_and(|name| name.to_string_lossy() == assembly_name))?;
    Some(LaunchPlan::new(
        LaunchSource::ManagedAssembly,
        "dotnet",
        vec![assembly.to_string_lossy().into_owned()],
        &config.app_dir,
    ))
}

fn has_start_script(package_json: &Path) -> bool {
    std::fs::read_to_string(package_json)
        .ok()
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
        .is_some_and(|doc| doc.pointer("/scripts/start").is_some_and(serde_json::Value::is_string))
}

/// Launch plan for a browser-bundle server.
pub(super) fn browser_bundle(config: &DispatchConfig) -> Option<LaunchPlan> {
    let app = &config.app_dir;
    let package_json = app.join("package.json");
    if !package_json.is_file() {
        return None;
    }
    if has_start_script(&package_json) {
        return Some(LaunchPlan::new(
            LaunchSource::BrowserBundle,
            "npm",
            vec!["start".to_string()],
            app,
        ));
    }
    ["server.js", "index.js"]
        .into_iter()
        .find(|script| app.join(script).is_file())
        .map(|script| {
            LaunchPlan::new(LaunchSource::BrowserBundle, "node", vec![script.to_string()], app)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_find_entry_symbol() {
        let src = "import os\nfrom fastapi import FastAPI\n\napi = FastAPI(title='x')\n";
        assert_eq!(find_entry_symbol(src), Some(("api".to_string(), Framework::FastApi)));

        let src = "server: Flask = Flask(__name__)\n";
        assert_eq!(find_entry_symbol(src), Some(("server".to_string(), Framework::Flask)));

        assert_eq!(find_entry_symbol("# app = FastAPI()\nx = 1\n"), None);
    }

    #[test]
    fn test_module_name() {
        let app = Path::new("/app");
        assert_eq!(module_name(app, Path::new("/app/svc/main.py")), Some("svc.main".to_string()));
        assert_eq!(module_name(app, Path::new("/app/svc/__init__.py")), Some("svc".to_string()));
    }

    #[test]
    fn test_first_sorted_match_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b/web.py"), "web = Flask(__name__)\n").unwrap();
        std::fs::write(dir.path().join("a.py"), "app = Starlette()\n").unwrap();

        let entry = interpreted_entry(dir.path(), None).unwrap();
        assert_eq!(entry.target(), "a:app");
        assert_eq!(entry.framework, Framework::Starlette);
    }

    #[test]
    fn test_installed_dependencies_are_not_scanned() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join(".deps/fastapi");
        std::fs::create_dir_all(&lib).unwrap();
        std::fs::write(
            lib.join("applications.py"),
            "class FastAPI:\n    \"\"\"\n        app = FastAPI(title=\"x\")\n    \"\"\"\n",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("__pycache__")).unwrap();
        std::fs::write(dir.path().join("__pycache__/a.py"), "app = Flask(__name__)\n").unwrap();
        std::fs::write(dir.path().join("main.py"), "app = FastAPI()\n").unwrap();

        let entry = interpreted_entry(dir.path(), None).unwrap();
        assert_eq!(entry.target(), "main:app");
    }

    #[test]
    fn test_dependency_dir_extends_environment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".deps/bin")).unwrap();
        std::fs::write(dir.path().join("main.py"), "app = FastAPI()\n").unwrap();
        let mut config = DispatchConfig::default().with_app_dir(dir.path());
        config.search_path = vec![PathBuf::from("/usr/bin")];

        let plan = interpreted(&config).unwrap();
        let deps = dir.path().join(DEPS_DIR);
        assert_eq!(plan.env["PYTHONPATH"], deps.to_string_lossy());
        let path: Vec<PathBuf> = std::env::split_paths(&plan.env["PATH"]).collect();
        assert_eq!(path, vec![deps.join("bin"), PathBuf::from("/usr/bin")]);
    }

    #[test]
    fn test_no_dependency_dir_leaves_environment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "app = FastAPI()\n").unwrap();
        let config = DispatchConfig::default().with_app_dir(dir.path());

        let plan = interpreted(&config).unwrap();
        assert!(!plan.env.contains_key("PYTHONPATH"));
        assert!(!plan.env.contains_key("PATH"));
    }

    #[test]
    fn test_module_hint_is_scanned_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "app = FastAPI()\n").unwrap();
        std::fs::write(dir.path().join("z.py"), "site = Flask(__name__)\n").unwrap();

        let entry = interpreted_entry(dir.path(), Some("z")).unwrap();
        assert_eq!(entry.target(), "z:site");
        assert_eq!(entry.framework, Framework::Flask);
    }

    #[test]
    fn test_symbol_hint_used_directly() {
        let dir = tempfile::tempdir().unwrap();
        let entry = interpreted_entry(dir.path(), Some("svc.main:application")).unwrap();
        assert_eq!(entry.target(), "svc.main:application");
        assert!(entry.framework.is_asgi());
    }

    #[test]
    fn test_managed_needs_project_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        std::fs::write(dir.path().join("bin/Shop.dll"), "").unwrap();
        let config = DispatchConfig::default().with_app_dir(dir.path());
        assert!(managed(&config).is_none());

        std::fs::write(dir.path().join("Shop.csproj"), "<Project/>").unwrap();
        let plan = managed(&config).unwrap();
        assert_eq!(plan.program, "dotnet");
        assert!(plan.args[0].ends_with("bin/Shop.dll"));
    }

    #[test]
    fn test_browser_bundle_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = DispatchConfig::default().with_app_dir(dir.path());
        assert!(browser_bundle(&config).is_none());

        std::fs::write(dir.path().join("package.json"), r#"{"name": "ui"}"#).unwrap();
        std::fs::write(dir.path().join("index.js"), "").unwrap();
        std::fs::write(dir.path().join("server.js"), "").unwrap();
        assert_eq!(browser_bundle(&config).unwrap().args, vec!["server.js"]);

        std::fs::write(
            dir.path().join("package.json"),
            r#"{"scripts": {"start": "node server.js"}}"#,
        )
        .unwrap();
        let plan = browser_bundle(&config).unwrap();
        assert_eq!(plan.program, "npm");
        assert_eq!(plan.args, vec!["start"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_compiled_requires_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join(COMPILED_BINARY);
        std::fs::write(&binary, "#!/bin/sh\n").unwrap();

        let mut config = DispatchConfig::default();
        config.search_path = vec![dir.path().to_path_buf()];
        assert!(compiled(&config).is_none());

        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(compiled(&config).unwrap().program, binary.to_string_lossy());
    }
}
