//! `sroot pack`: Gzip an uncompressed tar stream into an image file.

use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use sandroot_image::compress::compress;

/// Arguments for the `pack` command.
#[derive(Args, Debug)]
pub struct PackArgs {
    /// Uncompressed tar file, or `-` for stdin.
    #[arg(long, default_value = "-")]
    pub input: String,

    /// Destination `.tar.gz` file.
    #[arg(long)]
    pub output: PathBuf,
}

/// Executes the `pack` command.
///
/// # Errors
///
/// Returns an error if the input cannot be read or the output written.
pub fn execute(args: &PackArgs) -> anyhow::Result<()> {
    let input: Box<dyn Read + Send> = if args.input == "-" {
        Box::new(std::io::stdin())
    } else {
        Box::new(
            std::fs::File::open(&args.input)
                .with_context(|| format!("opening {}", args.input))?,
        )
    };

    let mut stream = compress(input).context("starting compression")?;
    let file = std::fs::File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let mut out = BufWriter::new(file);
    let written = std::io::copy(&mut stream, &mut out).context("compressing")?;
    out.flush()
        .with_context(|| format!("writing {}", args.output.display()))?;

    tracing::info!(output = %args.output.display(), bytes = written, "image packed");
    crate::output::status(
        "Packed",
        &format!(
            "{} ({})",
            args.output.display(),
            crate::output::format_size(Some(written))
        ),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use flate2::read::GzDecoder;

    use super::*;

    #[test]
    fn pack_writes_gzip_of_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("rootfs.tar");
        let output = dir.path().join("rootfs.tar.gz");
        std::fs::write(&input, b"pretend this is a tar stream".repeat(100)).expect("write");

        execute(&PackArgs {
            input: input.display().to_string(),
            output: output.clone(),
        })
        .expect("pack");

        let mut decoded = Vec::new();
        let _ = GzDecoder::new(std::fs::File::open(&output).expect("open"))
            .read_to_end(&mut decoded)
            .expect("gunzip");
        assert_eq!(decoded, std::fs::read(&input).expect("read"));
    }

    #[test]
    fn missing_input_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = execute(&PackArgs {
            input: "/nonexistent/rootfs.tar".into(),
            output: dir.path().join("out.tar.gz"),
        })
        .expect_err("missing");
        assert!(err.to_string().contains("/nonexistent/rootfs.tar"));
        assert!(!dir.path().join("out.tar.gz").exists());
    }
}
