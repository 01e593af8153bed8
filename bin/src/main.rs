#[macro_use]
extern crate log;

use clap::Parser;
use raydn_core::app::create_progress_reporter;
use raydn_core::frame::FrameInfo;
use raydn_core::geometry::{matrix4x4, Matrix4x4};
use raydn_core::image_io::{read_exr, write_image};
use raydn_core::raydn::Float;
use denoiser::{Denoiser, DenoiserParams};
use indicatif::ProgressBar;
use std::fs;

/// System wide options.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Options {
    /// Directory holding the input frame sequence.
    #[clap(
        long = "input",
        short = 'i',
        value_name = "DIR",
        help = "Read frames (beauty/normal/position EXRs and camera files) from the given directory."
    )]
    input: String,

    /// Directory the denoised frames are written into.
    #[clap(
        long = "output",
        short = 'o',
        value_name = "DIR",
        help = "Write denoised frames into the given directory."
    )]
    output: String,

    /// Number of frames to process.
    #[clap(
        long = "frames",
        short = 'n',
        value_name = "NUM",
        help = "Process the given number of frames."
    )]
    frames: usize,

    /// Index of the first frame.
    #[clap(
        long = "start",
        value_name = "NUM",
        default_value_t = 0,
        help = "Start the sequence at the given frame index."
    )]
    start: usize,

    /// Number of threads to use for denoising. Zero means all logical CPUs.
    #[clap(
        long = "nthreads",
        short = 't',
        value_name = "NUM",
        default_value_t = 0,
        help = "Use specified number of threads for denoising (0 = all logical CPUs)."
    )]
    n_threads: usize,

    /// Temporal blend factor.
    #[clap(
        long = "alpha",
        value_name = "FLOAT",
        default_value_t = 0.2,
        help = "Temporal blend factor in (0, 1]; smaller values smooth more."
    )]
    alpha: Float,

    /// Spatial filter kernel radius.
    #[clap(
        long = "radius",
        value_name = "NUM",
        default_value_t = 16,
        help = "Half width of the spatial filter window."
    )]
    kernel_radius: usize,

    /// Output image format.
    #[clap(
        long = "format",
        value_name = "EXT",
        default_value = "png",
        help = "Output image format: png (gamma corrected) or exr (linear)."
    )]
    format: String,

    /// Suppress the progress bar.
    #[clap(long, help = "Suppress the progress bar.")]
    quiet: bool,
}

fn main() {
    // Initialize `env_logger`.
    env_logger::init();

    let options = Options::parse();

    let params = DenoiserParams {
        kernel_radius: options.kernel_radius,
        alpha: options.alpha,
        n_threads: if options.n_threads == 0 {
            num_cpus::get()
        } else {
            options.n_threads
        },
        ..DenoiserParams::default()
    };
    let mut denoiser = Denoiser::new(params);

    let progress = if options.quiet {
        ProgressBar::hidden()
    } else {
        create_progress_reporter(options.frames as u64)
    };
    progress.set_message("Denoising frames");

    // A failed frame aborts the run; skipping it would leave the history
    // out of step with the matrices on disk.
    for index in options.start..options.start + options.frames {
        if let Err(err) = process_frame(&mut denoiser, &options, index) {
            error!("{err}");
            std::process::exit(1);
        }
        progress.inc(1);
    }

    progress.finish_with_message("Denoise complete");
}

/// Load one frame, denoise it and write the result.
///
/// * `denoiser` - The denoising pipeline.
/// * `options`  - Command line options.
/// * `index`    - The frame index.
fn process_frame(denoiser: &mut Denoiser, options: &Options, index: usize) -> Result<(), String> {
    let frame = load_frame(&options.input, index)?;
    let denoised = denoiser.process_frame(&frame);

    let path = format!("{}/frame_{index}.{}", options.output, options.format);
    write_image(&path, &denoised)
}

/// Load the buffers and camera transforms of one frame.
///
/// * `input` - The input directory.
/// * `index` - The frame index.
fn load_frame(input: &str, index: usize) -> Result<FrameInfo, String> {
    let beauty = read_exr(&format!("{input}/beauty_{index}.exr"))?;
    let normal = read_exr(&format!("{input}/normal_{index}.exr"))?;
    let position = read_exr(&format!("{input}/position_{index}.exr"))?;
    let matrices = read_matrices(&format!("{input}/camera_{index}.txt"))?;
    Ok(FrameInfo::new(beauty, normal, position, matrices))
}

/// Read a list of row-major 4x4 matrices from a plain text file of
/// whitespace separated floats, ending with the frame's world-to-camera
/// and world-to-screen matrices.
///
/// * `path` - The camera file path.
fn read_matrices(path: &str) -> Result<Vec<Matrix4x4>, String> {
    let contents =
        fs::read_to_string(path).map_err(|err| format!("Error reading {path}: {err}"))?;

    let values = contents
        .split_whitespace()
        .map(|token| {
            token
                .parse::<Float>()
                .map_err(|err| format!("Invalid matrix value '{token}' in {path}: {err}"))
        })
        .collect::<Result<Vec<_>, String>>()?;

    if values.len() < 32 || values.len() % 16 != 0 {
        return Err(format!(
            "Expected whole 4x4 matrices and at least two of them in {path}, got {} values",
            values.len()
        ));
    }

    Ok(values
        .chunks(16)
        .map(|m| {
            matrix4x4(
                m[0], m[1], m[2], m[3], m[4], m[5], m[6], m[7], m[8], m[9], m[10], m[11], m[12],
                m[13], m[14], m[15],
            )
        })
        .collect())
}
