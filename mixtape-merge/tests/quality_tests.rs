//! Quality negotiation over probed files

mod helpers;

use helpers::{flac_probe, mp3_probe, FakeProber};
use mixtape_merge::models::ContainerFormat;
use mixtape_merge::quality::QualityAnalyzer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn write_inputs(dir: &Path, contents: &[String]) -> Vec<PathBuf> {
    contents
        .iter()
        .enumerate()
        .map(|(i, content)| {
            let path = dir.join(format!("input-{}", i));
            std::fs::write(&path, content).unwrap();
            path
        })
        .collect()
}

async fn analyze(contents: &[String]) -> mixtape_merge::quality::Analysis {
    let temp = TempDir::new().unwrap();
    let paths = write_inputs(temp.path(), contents);
    let refs: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
    QualityAnalyzer::new(Arc::new(FakeProber)).analyze(&refs).await
}

#[tokio::test]
async fn test_lossy_inputs_take_highest_bitrate() {
    let analysis = analyze(&[mp3_probe(128, 44_100), mp3_probe(256, 44_100)]).await;

    assert!(!analysis.profile.lossless);
    assert_eq!(analysis.profile.bitrate_kbps, Some(256));
    assert_eq!(analysis.profile.container, ContainerFormat::Mp3);
    assert_eq!(analysis.total_duration, Some(Duration::from_secs(120)));
}

#[tokio::test]
async fn test_bitrate_clamped_to_ceiling() {
    let analysis = analyze(&[mp3_probe(400, 44_100), mp3_probe(128, 44_100)]).await;
    assert_eq!(analysis.profile.bitrate_kbps, Some(320));
}

#[tokio::test]
async fn test_bitrate_raised_to_floor() {
    let analysis = analyze(&[mp3_probe(96, 22_050), mp3_probe(64, 22_050)]).await;

    assert_eq!(analysis.profile.bitrate_kbps, Some(192));
    assert_eq!(analysis.profile.sample_rate, 44_100);
    assert_eq!(analysis.profile.channels, 2);
}

#[tokio::test]
async fn test_any_lossless_input_makes_output_lossless() {
    let analysis = analyze(&[mp3_probe(320, 44_100), flac_probe(96_000)]).await;

    assert!(analysis.profile.lossless);
    assert_eq!(analysis.profile.bitrate_kbps, None);
    assert_eq!(analysis.profile.container, ContainerFormat::Flac);
    assert_eq!(analysis.profile.codec, "flac");
    assert_eq!(analysis.profile.sample_rate, 96_000);
}

#[tokio::test]
async fn test_input_order_does_not_change_profile() {
    let forward = analyze(&[mp3_probe(160, 48_000), flac_probe(44_100)]).await;
    let reverse = analyze(&[flac_probe(44_100), mp3_probe(160, 48_000)]).await;
    assert_eq!(forward.profile, reverse.profile);
}

#[tokio::test]
async fn test_unprobeable_input_uses_defaults() {
    let analysis = analyze(&["not audio".to_string(), "also not audio".to_string()]).await;

    assert_eq!(analysis.probes.len(), 2);
    assert!(analysis.probes.iter().all(|p| p.codec == "unknown"));
    assert!(!analysis.profile.lossless);
    assert_eq!(analysis.profile.sample_rate, 44_100);
    assert_eq!(analysis.profile.channels, 2);
    assert_eq!(analysis.profile.bitrate_kbps, Some(192));
    assert_eq!(analysis.total_duration, None);
}

#[tokio::test]
async fn test_one_failed_probe_does_not_mask_lossless_input() {
    let analysis = analyze(&["garbage".to_string(), flac_probe(48_000)]).await;

    assert!(analysis.profile.lossless);
    assert_eq!(analysis.profile.sample_rate, 48_000);
}
