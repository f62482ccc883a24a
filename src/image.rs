/// Image build/push planning.
///
/// Resolves CLI arguments against configuration into a concrete plan and logs
/// it. Nothing is executed against a container engine or registry.
use crate::config::DockerConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, PartialEq, Eq)]
pub enum ImageError {
    /// Image reference was empty.
    EmptyReference,
    /// Reference had a `:` but nothing after it.
    EmptyTag { reference: String },
}

impl std::fmt::Display for ImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageError::EmptyReference => write!(f, "image name is required"),
            ImageError::EmptyTag { reference } => {
                write!(f, "image reference {:?} has an empty tag", reference)
            }
        }
    }
}

impl std::error::Error for ImageError {}

/// `name[:tag]`, where `name` may include a registry host with a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub name: String,
    pub tag: String,
}

impl ImageRef {
    /// Parse a reference, using `default_tag` when none is given.
    ///
    /// Only a `:` after the last `/` starts a tag, so `localhost:5000/app` is a name.
    pub fn parse(reference: &str, default_tag: &str) -> Result<Self, ImageError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ImageError::EmptyReference);
        }

        let last_segment = reference.rfind('/').map_or(0, |i| i + 1);
        match reference[last_segment..].rfind(':') {
            Some(i) => {
                let split = last_segment + i;
                let (name, tag) = (&reference[..split], &reference[split + 1..]);
                if tag.is_empty() {
                    return Err(ImageError::EmptyTag {
                        reference: reference.to_string(),
                    });
                }
                if name.is_empty() {
                    return Err(ImageError::EmptyReference);
                }
                Ok(Self {
                    name: name.to_string(),
                    tag: tag.to_string(),
                })
            }
            None => Ok(Self {
                name: reference.to_string(),
                tag: default_tag.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

#[derive(Debug)]
pub struct BuildPlan {
    pub image: ImageRef,
    pub dockerfile: PathBuf,
    pub context: PathBuf,
    pub timeout: Duration,
}

impl BuildPlan {
    pub fn resolve(
        tag: &str,
        dockerfile: PathBuf,
        context: PathBuf,
        docker: &DockerConfig,
    ) -> Result<Self, ImageError> {
        Ok(Self {
            image: ImageRef::parse(tag, &docker.default_tag)?,
            dockerfile,
            context,
            timeout: Duration::from_secs(docker.build_timeout_secs),
        })
    }

    /// Log the plan and announce the build.
    pub fn run(&self) {
        tracing::debug!(
            image = %self.image,
            dockerfile = %self.dockerfile.display(),
            context = %self.context.display(),
            timeout_secs = self.timeout.as_secs(),
            "resolved build plan"
        );
        println!("Building Docker image...");
    }
}

#[derive(Debug)]
pub struct PushPlan {
    pub image: ImageRef,
    pub registry: String,
}

impl PushPlan {
    /// Registry comes from the flag when given, otherwise from config.
    pub fn resolve(
        image: &str,
        registry: Option<String>,
        docker: &DockerConfig,
    ) -> Result<Self, ImageError> {
        Ok(Self {
            image: ImageRef::parse(image, &docker.default_tag)?,
            registry: registry.unwrap_or_else(|| docker.registry.clone()),
        })
    }

    /// Fully qualified destination, e.g. `docker.io/app:1.0`.
    pub fn destination(&self) -> String {
        let registry = self.registry.trim_end_matches('/');
        if registry.is_empty() {
            self.image.to_string()
        } else {
            format!("{}/{}", registry, self.image)
        }
    }

    pub fn run(&self) {
        tracing::debug!(
            image = %self.image,
            registry = %self.registry,
            destination = %self.destination(),
            "resolved push plan"
        );
        println!("Pushing Docker image...");
    }
}
