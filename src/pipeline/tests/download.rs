use crate::pipeline::test_helpers::{create_test_pipeline, record_for_server, test_date};
use crate::types::{TaskOutcome, TaskStatus};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PDF_BYTES: &[u8] = b"%PDF-1.4 test fixture contents";

async fn mount_pdf(server: &MockServer, id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/pdf/{id}.pdf")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_BYTES))
        .mount(server)
        .await;
}

#[tokio::test]
async fn download_batch_persists_files_and_manifest() {
    let server = MockServer::start().await;
    mount_pdf(&server, "2401.00001").await;
    mount_pdf(&server, "2401.00002").await;

    let records = vec![
        record_for_server(&server.uri(), "2401.00001"),
        record_for_server(&server.uri(), "2401.00002"),
    ];
    let (pipeline, temp_dir) = create_test_pipeline(&server.uri(), &server.uri(), records.clone()).await;

    let ctx = pipeline.run_context(test_date());
    let outcomes = pipeline.download_batch(&ctx, &records).await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|(_, o)| *o == TaskOutcome::Downloaded));

    for id in ["2401.00001", "2401.00002"] {
        let dest = temp_dir
            .path()
            .join("downloaded_papers")
            .join("2025-06-01")
            .join(format!("{id}.pdf"));
        let bytes = std::fs::read(&dest).unwrap();
        assert_eq!(bytes, PDF_BYTES);

        let row = pipeline.db.get_task(test_date(), id).await.unwrap().unwrap();
        assert_eq!(row.task_status(), TaskStatus::Succeeded);
        assert_eq!(row.attempts, 1);
        assert!(row.error_message.is_none());
    }

    // The tree holds exactly the two PDFs under the date partition, no
    // stray temp files
    let files: Vec<String> = walkdir::WalkDir::new(temp_dir.path().join("downloaded_papers"))
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(temp_dir.path())
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    let mut files = files;
    files.sort();
    assert_eq!(
        files,
        vec![
            "downloaded_papers/2025-06-01/2401.00001.pdf",
            "downloaded_papers/2025-06-01/2401.00002.pdf",
        ]
    );
}

#[tokio::test]
async fn failed_task_does_not_block_the_batch() {
    let server = MockServer::start().await;
    mount_pdf(&server, "2401.00001").await;
    // 2401.00002 is never mounted: every request is a 404
    mount_pdf(&server, "2401.00003").await;

    let records = vec![
        record_for_server(&server.uri(), "2401.00001"),
        record_for_server(&server.uri(), "2401.00002"),
        record_for_server(&server.uri(), "2401.00003"),
    ];
    let (pipeline, _temp_dir) =
        create_test_pipeline(&server.uri(), &server.uri(), records.clone()).await;

    let ctx = pipeline.run_context(test_date());
    let outcomes = pipeline.download_batch(&ctx, &records).await.unwrap();

    assert_eq!(outcomes[0].1, TaskOutcome::Downloaded);
    assert!(matches!(outcomes[1].1, TaskOutcome::Failed(_)));
    assert_eq!(outcomes[2].1, TaskOutcome::Downloaded, "failure must not block later tasks");

    let failed = pipeline
        .db
        .get_task(test_date(), "2401.00002")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.task_status(), TaskStatus::Failed);
    // Initial attempt + 2 retries, never more
    assert_eq!(failed.attempts, 3);
    assert!(failed.error_message.unwrap().contains("404"));
}

#[tokio::test]
async fn rerun_skips_already_succeeded_tasks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pdf/2401.00001.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_BYTES))
        .expect(1) // the second batch must not re-download
        .mount(&server)
        .await;

    let records = vec![record_for_server(&server.uri(), "2401.00001")];
    let (pipeline, _temp_dir) =
        create_test_pipeline(&server.uri(), &server.uri(), records.clone()).await;

    let ctx = pipeline.run_context(test_date());
    let first = pipeline.download_batch(&ctx, &records).await.unwrap();
    assert_eq!(first[0].1, TaskOutcome::Downloaded);

    let second = pipeline.download_batch(&ctx, &records).await.unwrap();
    assert_eq!(second[0].1, TaskOutcome::Skipped);

    // Manifest unchanged by the re-run
    let row = pipeline
        .db
        .get_task(test_date(), "2401.00001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.task_status(), TaskStatus::Succeeded);
    assert_eq!(row.attempts, 1);
}

#[tokio::test]
async fn empty_body_is_retried_then_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pdf/2401.00001.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(Vec::<u8>::new()))
        .expect(3) // initial + 2 retries
        .mount(&server)
        .await;

    let records = vec![record_for_server(&server.uri(), "2401.00001")];
    let (pipeline, temp_dir) =
        create_test_pipeline(&server.uri(), &server.uri(), records.clone()).await;

    let ctx = pipeline.run_context(test_date());
    let outcomes = pipeline.download_batch(&ctx, &records).await.unwrap();

    assert!(matches!(outcomes[0].1, TaskOutcome::Failed(_)));
    let dest = temp_dir
        .path()
        .join("downloaded_papers")
        .join("2025-06-01")
        .join("2401.00001.pdf");
    assert!(!dest.exists(), "no destination file for an empty body");
}

#[tokio::test]
async fn cancelled_run_abandons_remaining_tasks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_BYTES))
        .expect(0)
        .mount(&server)
        .await;

    let records = vec![record_for_server(&server.uri(), "2401.00001")];
    let (pipeline, _temp_dir) =
        create_test_pipeline(&server.uri(), &server.uri(), records.clone()).await;

    let ctx = pipeline.run_context(test_date());
    ctx.cancel.cancel();

    let outcomes = pipeline.download_batch(&ctx, &records).await.unwrap();
    assert!(outcomes.is_empty(), "cancelled batch starts nothing");
}
