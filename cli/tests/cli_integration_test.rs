use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

fn tmp_path(name: &str) -> PathBuf {
    let tmp_dir = std::env::temp_dir().join(format!("tonelink-cli-{}", std::process::id()));
    fs::create_dir_all(&tmp_dir).ok();
    tmp_dir.join(name)
}

fn run_tonelink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tonelink"))
        .args(args)
        .output()
        .expect("Failed to execute tonelink")
}

fn combined(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string() + &String::from_utf8_lossy(&output.stdout)
}

#[test]
fn test_encode_writes_one_tone_per_symbol() {
    let output = tmp_path("encode_16.wav");

    let result = run_tonelink(&[
        "encode",
        "12",
        output.to_str().unwrap(),
        "--sample-rate",
        "8000",
        "--tone-ms",
        "100",
        "--mute-ms",
        "50",
    ]);
    assert!(result.status.success(), "encode failed: {}", combined(&result));
    assert!(combined(&result).contains("Encoded"));

    let mut reader = hound::WavReader::open(&output).expect("Output file not readable");
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 8000);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.channels, 1);

    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    // START, '1', '2', STOP, then the gap
    assert_eq!(samples.len(), 4 * 800 + 400);
    assert!(samples[3200..].iter().all(|&s| s == 128));
    assert!(samples[..800].iter().any(|&s| s > 16000));
}

#[test]
fn test_encode_eight_bit() {
    let output = tmp_path("encode_8.wav");

    let result = run_tonelink(&[
        "encode",
        "ab",
        output.to_str().unwrap(),
        "--codebook",
        "abc",
        "--bits",
        "8",
        "--sample-rate",
        "8000",
        "--buffer-size",
        "100",
    ]);
    assert!(result.status.success(), "encode failed: {}", combined(&result));

    let mut reader = hound::WavReader::open(&output).expect("Output file not readable");
    assert_eq!(reader.spec().bits_per_sample, 8);
    let samples: Vec<i8> = reader.samples::<i8>().map(|s| s.unwrap()).collect();
    assert_eq!(samples.len(), 4 * 800);
    assert!(samples.iter().all(|&s| (-64..=64).contains(&s)));
}

#[test]
fn test_encode_rejects_unknown_character() {
    let output = tmp_path("encode_bad.wav");

    let result = run_tonelink(&["encode", "19", output.to_str().unwrap()]);
    assert!(!result.status.success());
    assert!(combined(&result).contains("UnknownCharacter"));
}

#[test]
fn test_encode_rejects_oversized_codebook() {
    let output = tmp_path("encode_long.wav");

    let result = run_tonelink(&[
        "encode",
        "1",
        output.to_str().unwrap(),
        "--codebook",
        "1234567",
    ]);
    assert!(!result.status.success());
    assert!(combined(&result).contains("CodebookTooLong"));
}

#[test]
fn test_encode_into_missing_directory_fails() {
    let output = tmp_path("no-such-dir").join("nested").join("out.wav");

    let result = run_tonelink(&["encode", "12", output.to_str().unwrap()]);
    assert!(!result.status.success(), "encode reported success: {}", combined(&result));
    assert!(combined(&result).contains("Sink"));
    assert!(!combined(&result).contains("Encoded"));
    assert!(!output.exists());
}
