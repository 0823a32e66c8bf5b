use miette::{miette, Report, Severity};

// Image errors

pub fn image_unaligned(len: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "image::unaligned",
        help = "images are made of 16-bit words; the file may be truncated or not an LC3 image",
        "File is not aligned to 16 bits ({len} bytes)",
    )
}

pub fn image_empty() -> Report {
    miette!(
        severity = Severity::Error,
        code = "image::empty",
        help = "the first word of an image is the address to load it at",
        "Image has no origin word",
    )
}

pub fn image_truncated(orig: u16, len: usize) -> Report {
    miette!(
        severity = Severity::Warning,
        code = "image::truncated",
        help = "words past address 0xffff are not loaded",
        "Image at 0x{orig:04x} with {len} words does not fit in memory",
    )
}
