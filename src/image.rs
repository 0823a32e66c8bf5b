use std::fs;
use std::path::Path;

use miette::{IntoDiagnostic, Report, Result, WrapErr};

use crate::error;

/// Program image: a block of words and the address it is loaded at.
///
/// On disk an image is a sequence of big-endian words, the first of which is the origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    orig: u16,
    words: Vec<u16>,
}

impl Image {
    pub fn new(orig: u16, words: Vec<u16>) -> Self {
        Self { orig, words }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read image `{}`", path.display()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 2 != 0 {
            return Err(error::image_unaligned(bytes.len()));
        }

        let mut words = bytes
            .chunks_exact(2)
            .map(|word| u16::from_be_bytes([word[0], word[1]]));
        let Some(orig) = words.next() else {
            return Err(error::image_empty());
        };

        Ok(Self {
            orig,
            words: words.collect(),
        })
    }

    /// Address of first word.
    pub fn orig(&self) -> u16 {
        self.orig
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    /// Whether every word lands inside the address space when loaded at origin.
    pub fn fits(&self) -> bool {
        self.orig as usize + self.words.len() <= crate::runtime::MEMORY_MAX
    }

    /// Warning to show when part of the image will be cut off by loading it.
    pub fn truncation_warning(&self) -> Option<Report> {
        (!self.fits()).then(|| error::image_truncated(self.orig, self.words.len()))
    }
}
