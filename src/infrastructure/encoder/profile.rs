pub const INPUT_FILE: &str = "input.mp4";
pub const OUTPUT_FILE: &str = "output.mp4";

/// Thread ceiling for the encode. Fixed policy, independent of the host.
pub const MAX_THREADS: u32 = 8;
/// Used when the caller cannot report its parallelism.
pub const DEFAULT_CPU_CORES: u32 = 4;

pub fn thread_count(cpu_cores: Option<u32>) -> u32 {
    let cores = match cpu_cores {
        Some(cores) if cores > 0 => cores,
        _ => DEFAULT_CPU_CORES,
    };
    cores.min(MAX_THREADS)
}

/// Lossless x265 encode of `input.mp4` into `output.mp4`.
pub fn compression_args(threads: u32) -> Vec<String> {
    let threads = threads.to_string();
    [
        "-i",
        INPUT_FILE,
        "-c:v",
        "libx265",
        "-x265-params",
        "lossless=1",
        "-threads",
        threads.as_str(),
        OUTPUT_FILE,
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Generates a blank one-second clip as `input.mp4` for the performance probe.
pub fn synthetic_clip_args() -> Vec<String> {
    [
        "-f",
        "lavfi",
        "-i",
        "color=c=black:s=320x240:d=1",
        "-pix_fmt",
        "yuv420p",
        INPUT_FILE,
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_count_is_capped_at_eight() {
        assert_eq!(thread_count(Some(1)), 1);
        assert_eq!(thread_count(Some(2)), 2);
        assert_eq!(thread_count(Some(8)), 8);
        assert_eq!(thread_count(Some(16)), 8);
        assert_eq!(thread_count(Some(128)), 8);
    }

    #[test]
    fn thread_count_falls_back_to_four_cores() {
        assert_eq!(thread_count(None), 4);
        assert_eq!(thread_count(Some(0)), 4);
    }

    #[test]
    fn compression_args_match_the_lossless_profile() {
        assert_eq!(
            compression_args(6),
            vec![
                "-i",
                "input.mp4",
                "-c:v",
                "libx265",
                "-x265-params",
                "lossless=1",
                "-threads",
                "6",
                "output.mp4"
            ]
        );
    }

    #[test]
    fn synthetic_clip_writes_the_input_file() {
        let args = synthetic_clip_args();
        assert_eq!(args.last().map(String::as_str), Some(INPUT_FILE));
        assert!(args.iter().any(|a| a.contains("d=1")));
    }
}
