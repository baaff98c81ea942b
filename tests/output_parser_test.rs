//! Output stream parser driven through real async readers
//!
//! Run with: cargo test --test output_parser_test

use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use tokio::io::AsyncWriteExt;
use tubevault::download::output::{output_lines, LineTerminator, OutputLine};
use tubevault::download::ProgressExtractor;

async fn collect(reader: impl tokio::io::AsyncRead + Unpin) -> Vec<OutputLine> {
    output_lines(reader)
        .map(|line| line.expect("read"))
        .collect()
        .await
}

#[tokio::test]
async fn split_reads_across_pipe_writes() {
    let (reader, mut writer) = tokio::io::duplex(8);
    let writer_task = tokio::spawn(async move {
        for piece in ["PROGRESS:  1", "0.0% of 5MiB\rPROG", "RESS:  20.0% of 5MiB\r[download", "] Destination: a.mp4\ntail"] {
            writer.write_all(piece.as_bytes()).await.unwrap();
        }
    });

    let lines = collect(reader).await;
    writer_task.await.unwrap();

    let texts: Vec<String> = lines.iter().map(|l| l.text().into_owned()).collect();
    assert_eq!(
        texts,
        vec![
            "PROGRESS:  10.0% of 5MiB",
            "PROGRESS:  20.0% of 5MiB",
            "[download] Destination: a.mp4",
            "tail",
        ]
    );
    assert_eq!(lines[0].terminator, Some(LineTerminator::CarriageReturn));
    assert_eq!(lines[2].terminator, Some(LineTerminator::Newline));
    assert_eq!(lines[3].terminator, None);
}

#[tokio::test]
async fn raw_bytes_are_preserved_in_order() {
    let input = b"a\r\nb\n\nPROGRESS: 5%\rlast".to_vec();
    let lines = collect(&input[..]).await;

    let rebuilt: Vec<u8> = lines.iter().flat_map(|l| l.to_raw()).collect();
    assert_eq!(rebuilt, input);
}

#[tokio::test]
async fn only_marker_lines_become_progress() {
    let input = "[youtube] abc: Downloading webpage\nPROGRESS:  50.0% of 3.00MiB\rPROGRESS:\nERROR: nope\n";
    let extractor = ProgressExtractor::new(9);

    let events: Vec<_> = collect(input.as_bytes())
        .await
        .iter()
        .filter_map(|line| extractor.extract(&line.text()))
        .collect();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].job_id, 9);
    assert_eq!(events[0].progress, "PROGRESS:  50.0% of 3.00MiB");
    assert_eq!(events[0].percent(), Some(50.0));
}

#[tokio::test]
async fn empty_stream_yields_nothing() {
    assert!(collect(&b""[..]).await.is_empty());
}
