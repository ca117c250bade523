use clap::{Args, Parser};
use image_transfer::{
    config::{Credentials, Options},
    distribution::{self, StoredAuth},
    local, ImageName,
};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Parser)]
#[command(version)]
enum Opt {
    /// Pull image from registry into the local layout
    Pull {
        image_name: String,

        /// Root directory of local images, use data directory if not set.
        #[arg(short = 'd', long = "dir")]
        dir: Option<PathBuf>,

        #[command(flatten)]
        registry: RegistryArgs,
    },

    /// Push image in the local layout to registry
    Push {
        image_name: String,

        /// Image directory containing manifest.json
        dir: PathBuf,

        #[command(flatten)]
        registry: RegistryArgs,
    },

    /// Get image directory to be used for given image name
    TargetDir {
        image_name: String,

        /// Root directory of local images, use data directory if not set.
        #[arg(short = 'd', long = "dir")]
        dir: Option<PathBuf>,
    },

    /// List images in the local layout
    List {
        /// Root directory of local images, use data directory if not set.
        #[arg(short = 'd', long = "dir")]
        dir: Option<PathBuf>,
    },

    /// Store credentials of registry
    Login {
        /// Registry host, e.g. `ghcr.io` or `localhost:5000`
        registry: String,
        #[arg(short = 'u', long = "username")]
        username: String,
        #[arg(short = 'p', long = "password")]
        password: String,
    },
}

#[derive(Debug, Args)]
struct RegistryArgs {
    /// Use http instead of https
    #[arg(long = "insecure")]
    insecure: bool,

    #[arg(short = 'u', long = "username", requires = "password")]
    username: Option<String>,

    #[arg(short = 'p', long = "password", requires = "username")]
    password: Option<String>,

    /// Timeout of each request in seconds
    #[arg(long = "timeout")]
    timeout: Option<u64>,
}

impl RegistryArgs {
    fn options(&self) -> Options {
        let mut options = Options::default().insecure(self.insecure);
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            options = options.credentials(Credentials::new(username, password));
        }
        if let Some(timeout) = self.timeout {
            options = options.timeout(Duration::from_secs(timeout));
        }
        options
    }
}

fn root(dir: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    Ok(match dir {
        Some(dir) => dir,
        None => local::data_dir()?,
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    match Opt::parse() {
        Opt::Pull {
            image_name,
            dir,
            registry,
        } => {
            let image_name = ImageName::parse(&image_name)?;
            let pulled = distribution::pull(&image_name, &root(dir)?, &registry.options())?;
            println!("{}", pulled.dir.display());
        }

        Opt::Push {
            image_name,
            dir,
            registry,
        } => {
            let image_name = ImageName::parse(&image_name)?;
            distribution::push(&image_name, &dir, &registry.options())?;
        }

        Opt::TargetDir { image_name, dir } => {
            let image_name = ImageName::parse(&image_name)?;
            println!("{}", image_name.target_dir(&root(dir)?).display());
        }

        Opt::List { dir } => {
            for (path, repositories) in local::list_images(&root(dir)?)? {
                for (name, tags) in repositories {
                    for (tag, id) in tags {
                        println!("{}:{}\t{}\t{}", name, tag, id, path.display());
                    }
                }
            }
        }

        Opt::Login {
            registry,
            username,
            password,
        } => {
            let mut new_auth = StoredAuth::default();
            new_auth.insert(&registry, &Credentials::new(&username, &password));
            let mut auth = StoredAuth::load()?;
            auth.append(new_auth);
            auth.save()?;
            log::info!("Credentials for {} saved", registry);
        }
    }
    Ok(())
}
