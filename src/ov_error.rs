use std::{error, fmt};

/// Unified error type
///
/// Only asset import and configuration loading are recoverable. GPU and
/// physics resource exhaustion is treated as fatal by the backends, and
/// precondition violations (such as a channel targeting a joint that does
/// not exist) panic where they are detected.
///
/// Some foreign error types are very large so are boxed.
#[derive(Debug)]
pub enum OvError {
    InvalidFile,
    IndexTooLarge,
    VertexCountTooLarge,
    IndexCountTooLarge,
    ShaderCompile(String),
    SerdeYamlError(Box<serde_yaml::Error>),
    StdIoError(std::io::Error),
    TObjLoadError(tobj::LoadError),
    ImageImageError(Box<image::error::ImageError>),
    GltfError(Box<gltf::Error>),
    ImportError(crate::media::ImportError),
}

impl error::Error for OvError {}

impl fmt::Display for OvError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidFile => write!(f, "invalid file"),
            Self::IndexTooLarge => write!(f, "index does not fit in 32 bits"),
            Self::VertexCountTooLarge => {
                write!(f, "vertex count does not fit in 32 bits")
            }
            Self::IndexCountTooLarge => {
                write!(f, "index count does not fit in 32 bits")
            }
            Self::ShaderCompile(log) => {
                write!(f, "effect failed to compile: {log}")
            }
            Self::SerdeYamlError(e) => {
                write!(f, "serde_yaml::Error: {e}")
            }
            Self::StdIoError(e) => write!(f, "std::io::Error: {}", e.kind()),
            Self::TObjLoadError(e) => write!(f, "tobj crate LoadError: {e}"),
            Self::ImageImageError(e) => {
                write!(f, "image crate ImageError: {e}")
            }
            Self::GltfError(e) => {
                write!(f, "gltf Error: {e}")
            }
            Self::ImportError(e) => write!(f, "import error: {e}"),
        }
    }
}

impl From<serde_yaml::Error> for OvError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::SerdeYamlError(Box::new(e))
    }
}

impl From<std::io::Error> for OvError {
    fn from(e: std::io::Error) -> Self {
        Self::StdIoError(e)
    }
}

impl From<tobj::LoadError> for OvError {
    fn from(e: tobj::LoadError) -> Self {
        Self::TObjLoadError(e)
    }
}

impl From<image::error::ImageError> for OvError {
    fn from(e: image::error::ImageError) -> Self {
        Self::ImageImageError(Box::new(e))
    }
}

impl From<gltf::Error> for OvError {
    fn from(e: gltf::Error) -> Self {
        Self::GltfError(Box::new(e))
    }
}

impl From<crate::media::ImportError> for OvError {
    fn from(e: crate::media::ImportError) -> Self {
        Self::ImportError(e)
    }
}
