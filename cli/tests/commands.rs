use clap::Parser;
use pretty_assertions::assert_eq;
use serde_json::json;
use stt_corrector_cli::{Cli, run};

fn seed(dir: &tempfile::TempDir) -> String {
    let path = dir.path().join("kb.json");
    std::fs::write(
        &path,
        r#"{"corrections": [
            {"correct_phrase": "start meeting", "common_mistakes": ["start eating", "start meting"]},
            {"correct_phrase": "three pm", "common_mistakes": ["tree pm"]}
        ]}"#,
    )
    .unwrap();
    path.to_str().unwrap().to_string()
}

async fn run_args(args: &[&str]) -> serde_json::Value {
    let mut argv = vec!["stt-corrector"];
    argv.extend_from_slice(args);
    run(Cli::try_parse_from(argv).unwrap()).await.unwrap()
}

#[tokio::test]
async fn test_correct_single_text() {
    let dir = tempfile::tempdir().unwrap();
    let kb = seed(&dir);
    let output = run_args(&["--knowledge-base", &kb, "correct", "start eating"]).await;

    assert_eq!(output["corrected_text"], json!("start meeting"));
    assert_eq!(output["method"], json!("direct_match"));
    assert_eq!(output["correction_made"], json!(true));
}

#[tokio::test]
async fn test_correct_several_texts_is_a_batch() {
    let dir = tempfile::tempdir().unwrap();
    let kb = seed(&dir);
    let output = run_args(&[
        "--knowledge-base",
        &kb,
        "correct",
        "start meting",
        "hello there",
    ])
    .await;

    let results = output["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["corrected_text"], json!("start meeting"));
    assert_eq!(results[1]["method"], json!("none"));
}

#[tokio::test]
async fn test_plain_correction_prints_text_only() {
    let dir = tempfile::tempdir().unwrap();
    let kb = seed(&dir);
    let output = run_args(&[
        "--knowledge-base",
        &kb,
        "correct",
        "--plain",
        "start eating at tree pm",
    ])
    .await;

    assert_eq!(output, json!({"corrected_text": "start meeting at three pm"}));
}

#[tokio::test]
async fn test_add_and_stats() {
    let dir = tempfile::tempdir().unwrap();
    let kb = seed(&dir);

    let added = run_args(&[
        "--knowledge-base",
        &kb,
        "add",
        "--phrase",
        "end call",
        "--mistake",
        "and call",
        "--mistake",
        "in call",
        "--category",
        "calls",
    ])
    .await;
    assert_eq!(added["success"], json!(true));
    assert_eq!(added["entry_id"], json!(3));

    let stats = run_args(&["--knowledge-base", &kb, "stats"]).await;
    assert_eq!(stats["entries"], json!(2));
    assert_eq!(stats["mistakes"], json!(3));
}
