use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use vendor_patcher::host::EXTRA_PATCHES_APPLIED;
use vendor_patcher::{
    AppliedPatches, ConsoleIo, FsJsonReader, HostPlatform, HostServices, HttpFetcher,
    InstallationManager, MetadataSink, NullEvents, Package, PatchDriver, PatchError,
    SystemRunner,
};

#[derive(Parser)]
#[command(name = "vendor-patcher")]
#[command(about = "Apply source patches to installed dependency packages", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending patches and record bookkeeping
    Apply {
        /// Project directory containing patcher.json (defaults to cwd)
        #[arg(short, long)]
        project: Option<PathBuf>,

        /// Uninstall packages whose patch set changed before applying
        #[arg(long)]
        force_reinstall: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Report which packages need a reinstall because their patch set changed
    Check {
        #[arg(short, long)]
        project: Option<PathBuf>,
    },

    /// List the collected patches and their targets
    List {
        #[arg(short, long)]
        project: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Apply {
            project,
            force_reinstall,
            verbose,
        } => cmd_apply(project, force_reinstall, verbose),
        Commands::Check { project } => cmd_check(project),
        Commands::List { project } => cmd_list(project),
    }
}

/// On-disk project manifest: the root package plus the installed packages
/// with their install paths.
#[derive(Serialize, Deserialize)]
struct Manifest {
    root: ManifestPackage,
    #[serde(default)]
    packages: Vec<InstalledPackage>,
}

#[derive(Serialize, Deserialize)]
struct ManifestPackage {
    name: String,
    version: String,
    #[serde(default)]
    extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct InstalledPackage {
    name: String,
    version: String,
    path: PathBuf,
    #[serde(default)]
    extra: Map<String, Value>,
}

/// Backs [`InstallationManager`] and [`MetadataSink`] with the manifest file.
struct ManifestStore {
    manifest_path: PathBuf,
    project_dir: PathBuf,
    manifest: RefCell<Manifest>,
}

impl ManifestStore {
    fn load(project_dir: &Path) -> Result<Self> {
        let manifest_path = project_dir.join("patcher.json");
        let contents = fs::read_to_string(&manifest_path)
            .with_context(|| format!("failed to read {}", manifest_path.display()))?;
        let manifest: Manifest = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", manifest_path.display()))?;
        Ok(ManifestStore {
            manifest_path,
            project_dir: project_dir.to_path_buf(),
            manifest: RefCell::new(manifest),
        })
    }

    fn root(&self) -> Package {
        let manifest = self.manifest.borrow();
        Package::root(
            manifest.root.name.clone(),
            manifest.root.version.clone(),
            manifest.root.extra.clone(),
        )
    }

    fn packages(&self) -> Vec<Package> {
        self.manifest
            .borrow()
            .packages
            .iter()
            .map(|package| {
                Package::new(
                    package.name.clone(),
                    package.version.clone(),
                    package.extra.clone(),
                )
            })
            .collect()
    }

    fn resolved_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    fn save(&self) -> Result<(), PatchError> {
        let rendered = serde_json::to_string_pretty(&*self.manifest.borrow()).map_err(
            |source| PatchError::Json {
                path: self.manifest_path.display().to_string(),
                source,
            },
        )?;
        fs::write(&self.manifest_path, rendered).map_err(|source| PatchError::Io {
            path: self.manifest_path.display().to_string(),
            source,
        })
    }
}

impl InstallationManager for ManifestStore {
    fn install_path(&self, package: &Package) -> Result<PathBuf, PatchError> {
        let manifest = self.manifest.borrow();
        let found = manifest
            .packages
            .iter()
            .find(|candidate| {
                candidate.name == package.name() && candidate.version == package.version()
            })
            .ok_or_else(|| {
                PatchError::path_not_found(
                    package.name(),
                    Some(format!(
                        "the package {} is not listed in {}",
                        package.name(),
                        self.manifest_path.display()
                    )),
                )
            })?;
        Ok(self.resolved_path(&found.path))
    }

    fn uninstall(&self, package: &Package) -> Result<(), PatchError> {
        let path = self.install_path(package)?;
        fs::remove_dir_all(&path).map_err(|source| PatchError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

impl MetadataSink for ManifestStore {
    fn write_applied(
        &self,
        package: &Package,
        record: &AppliedPatches,
    ) -> Result<(), PatchError> {
        {
            let mut manifest = self.manifest.borrow_mut();
            let value = serde_json::to_value(record).map_err(|source| PatchError::Json {
                path: self.manifest_path.display().to_string(),
                source,
            })?;
            if package.is_root() {
                manifest
                    .root
                    .extra
                    .insert(EXTRA_PATCHES_APPLIED.to_string(), value);
            } else if let Some(entry) = manifest.packages.iter_mut().find(|candidate| {
                candidate.name == package.name() && candidate.version == package.version()
            }) {
                entry
                    .extra
                    .insert(EXTRA_PATCHES_APPLIED.to_string(), value);
            }
        }
        self.save()
    }
}

fn project_dir(project: Option<PathBuf>) -> Result<PathBuf> {
    let dir = match project {
        Some(dir) => dir,
        None => env::current_dir()?,
    };
    dir.canonicalize()
        .with_context(|| format!("project directory {} not found", dir.display()))
}

fn driver_for(store: Rc<ManifestStore>, verbose: bool) -> PatchDriver {
    PatchDriver::new(HostServices {
        io: Rc::new(ConsoleIo::new(verbose)),
        installs: store.clone(),
        events: Rc::new(NullEvents),
        runner: Rc::new(SystemRunner),
        platform: Rc::new(HostPlatform),
        fetcher: Rc::new(HttpFetcher::new()),
        json: Rc::new(FsJsonReader),
        metadata: store,
    })
}

fn cmd_apply(project: Option<PathBuf>, force_reinstall: bool, verbose: bool) -> Result<()> {
    let project_dir = project_dir(project)?;
    env::set_current_dir(&project_dir)?;
    let store = Rc::new(ManifestStore::load(&project_dir)?);
    let root = store.root();
    let packages = store.packages();
    let driver = driver_for(store, verbose);
    if force_reinstall {
        driver.pre_install(&root, &packages)?;
    }
    driver.post_install(&root, &packages)?;
    println!("{}", "Patching finished.".green());
    Ok(())
}

fn cmd_check(project: Option<PathBuf>) -> Result<()> {
    let project_dir = project_dir(project)?;
    env::set_current_dir(&project_dir)?;
    let store = Rc::new(ManifestStore::load(&project_dir)?);
    let root = store.root();
    let packages = store.packages();
    let driver = driver_for(store, false);
    let stale = driver.packages_needing_reinstall(&root, &packages)?;
    if stale.is_empty() {
        println!("{}", "All patched packages are up to date.".green());
    } else {
        for name in stale {
            println!("{} {}", "needs reinstall:".yellow(), name);
        }
    }
    Ok(())
}

fn cmd_list(project: Option<PathBuf>) -> Result<()> {
    let project_dir = project_dir(project)?;
    env::set_current_dir(&project_dir)?;
    let store = Rc::new(ManifestStore::load(&project_dir)?);
    let root = store.root();
    let packages = store.packages();
    let driver = driver_for(store, false);
    let collection = driver.patch_collection(&root, &packages)?;
    if collection.is_empty() {
        println!("No patches supplied.");
        return Ok(());
    }
    for patch in collection.iter() {
        let target = match patch.for_version() {
            Some(version) => format!("{}:{}", patch.for_package(), version),
            None => patch.for_package().to_string(),
        };
        println!(
            "{} {} {} ({})",
            target.bold(),
            patch.description(),
            patch.original_path().dimmed(),
            patch.from_package()
        );
    }
    Ok(())
}
