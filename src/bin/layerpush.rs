use clap::{Parser, ValueEnum};
use colored::Colorize;
use layerpush::{
    config, distribution::*, error::*, image::*, publish, store::*, Cancel, ImageName,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[clap(version)]
enum Opt {
    /// Build a directory into a single-layer image and push it to registry
    Push {
        /// Path of input directory
        #[clap(parse(from_os_str))]
        input_directory: PathBuf,

        /// Destination, e.g. `ghcr.io/someone/site:latest`
        image_name: String,

        /// Where blobs are kept while pushing
        #[clap(long, value_enum, default_value = "memory")]
        store: StoreKind,

        /// Directory of the `file` store
        #[clap(long, parse(from_os_str))]
        store_dir: Option<PathBuf>,

        /// Manifest and media type flavour
        #[clap(long, value_enum, default_value = "docker")]
        schema: SchemaKind,

        /// Path to annotations file
        #[clap(long, parse(from_os_str), default_value = "layerpush.toml")]
        annotations: PathBuf,

        #[clap(short = 'u', long = "username")]
        username: Option<String>,

        #[clap(short = 'p', long = "password")]
        password: Option<String>,

        /// Additional auth config file in docker `config.json` format, may be repeated
        #[clap(short = 'c', long = "config", parse(from_os_str))]
        auth_config: Vec<PathBuf>,
    },

    /// Get image from registry and unpack its layers into a directory
    Pull {
        image_name: String,

        /// Path of output directory
        #[clap(parse(from_os_str))]
        output_directory: PathBuf,

        /// Directory of the local blob store
        #[clap(long, parse(from_os_str))]
        store_dir: Option<PathBuf>,

        #[clap(short = 'u', long = "username")]
        username: Option<String>,

        #[clap(short = 'p', long = "password")]
        password: Option<String>,

        /// Additional auth config file in docker `config.json` format, may be repeated
        #[clap(short = 'c', long = "config", parse(from_os_str))]
        auth_config: Vec<PathBuf>,
    },

    /// Store credentials for a registry
    Login {
        /// Domain of registry, e.g. `ghcr.io`
        registry: String,

        #[clap(short = 'u', long = "username")]
        username: String,

        #[clap(short = 'p', long = "password")]
        password: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreKind {
    /// Process memory, nothing is kept
    Memory,
    /// Temporary directory removed on exit
    TmpFile,
    /// Persistent directory, `--store-dir` or the user data directory
    File,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SchemaKind {
    Docker,
    Oci,
}

fn resolver(
    image_name: &str,
    username: Option<String>,
    password: Option<String>,
    auth_files: &[PathBuf],
) -> Result<RegistryResolver> {
    let mut resolver = RegistryResolver::from_stored_auth()?;
    for path in auth_files {
        resolver.add_auth_file(path)?;
    }
    if let (Some(username), Some(password)) = (username, password) {
        let name = ImageName::parse(image_name)?;
        let domain = match name.port {
            Some(port) => format!("{}:{}", name.hostname, port),
            None => name.hostname,
        };
        resolver.add_basic_auth(&domain, &username, &password);
    }
    Ok(resolver)
}

fn file_store(store_dir: Option<PathBuf>) -> Result<FileStore> {
    match store_dir {
        Some(dir) => FileStore::open(dir),
        None => FileStore::persistent(),
    }
}

fn image_options(schema: SchemaKind, annotations_file: &Path) -> Result<ImageOptions> {
    let mut options = ImageOptions::new();
    if let SchemaKind::Oci = schema {
        options = options.oci();
    }
    if annotations_file.is_file() {
        options = options.annotations(annotations::load(annotations_file)?);
    }
    Ok(options)
}

fn run(opt: Opt) -> Result<()> {
    let cancel = Cancel::new();
    match opt {
        Opt::Push {
            input_directory,
            image_name,
            store,
            store_dir,
            schema,
            annotations,
            username,
            password,
            auth_config,
        } => {
            let resolver = resolver(&image_name, username, password, &auth_config)?;
            let options = image_options(schema, &annotations)?;
            let dir = input_directory.as_path();
            let digest = match store {
                StoreKind::Memory => publish::build_and_push_directory(
                    dir,
                    &image_name,
                    &mut MemoryStore::new(),
                    &resolver,
                    &options,
                    &cancel,
                )?,
                StoreKind::TmpFile => publish::build_and_push_directory(
                    dir,
                    &image_name,
                    &mut FileStore::temporary()?,
                    &resolver,
                    &options,
                    &cancel,
                )?,
                StoreKind::File => publish::build_and_push_directory(
                    dir,
                    &image_name,
                    &mut file_store(store_dir)?,
                    &resolver,
                    &options,
                    &cancel,
                )?,
            };
            println!("{}", digest);
        }

        Opt::Pull {
            image_name,
            output_directory,
            store_dir,
            username,
            password,
            auth_config,
        } => {
            let resolver = resolver(&image_name, username, password, &auth_config)?;
            let mut store = file_store(store_dir)?;
            let image = publish::pull_to_directory(
                &image_name,
                &output_directory,
                &mut store,
                &resolver,
                &cancel,
            )?;
            if let Some(manifest) = image.manifest {
                println!("{}", manifest.digest());
            }
        }

        Opt::Login {
            registry,
            username,
            password,
        } => {
            let mut auth = StoredAuth::load()?;
            auth.add(&registry, &username, &password);
            auth.save()?;
            log::info!("Credentials for {} saved", registry);
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    log::debug!("Data directory: {:?}", config::data_dir().ok());

    if let Err(e) = run(Opt::parse()) {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
