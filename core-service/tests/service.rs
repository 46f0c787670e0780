use async_trait::async_trait;
use bridge_desktop::{FileSecureStore, ReqwestHttpClient, TokioFileSystem};
use bridge_traits::{RetryPolicy, SystemClock};
use chrono::{Duration, Utc};
use core_auth::{
    AuthFlowController, Credential, CredentialStore, InteractiveAuthorizer, OAuthConfig,
    OAuthFlowManager, TokenGrant,
};
use core_runtime::config::{CHUNK_ALIGNMENT, DEFAULT_TOKEN_FILE_NAME, DRIVE_READONLY_SCOPE};
use core_service::{
    AppConfig, ClientRegistration, CoreError, DriveFetchService, EventBus, ListingOptions,
    ServiceParts, TransferError, TransferState,
};
use core_transfer::TransferEngine;
use provider_google_drive::{CatalogClient, DriveMediaSource};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING: &str = r#"{"files":[
    {"id":"doc1","name":"Report","mimeType":"application/vnd.google-apps.document"},
    {"id":"bin1","name":"photo.jpg","mimeType":"image/jpeg"},
    {"id":"gone","name":"missing.txt","mimeType":"text/plain"}
]}"#;

struct Fixture {
    server: MockServer,
    workdir: tempfile::TempDir,
    service: DriveFetchService,
}

impl Fixture {
    async fn new(access_token: &str) -> Self {
        let server = MockServer::start().await;
        let workdir = tempfile::tempdir().unwrap();

        let secure_store = Arc::new(FileSecureStore::new(workdir.path().join("store")));
        CredentialStore::new(secure_store.clone(), DEFAULT_TOKEN_FILE_NAME)
            .save(&Credential::new(
                access_token,
                Some("1//refresh".to_string()),
                Utc::now() + Duration::hours(1),
                vec![],
            ))
            .await
            .unwrap();

        let mut registration = ClientRegistration::new("client-id.apps.googleusercontent.com", None);
        registration.token_uri = format!("{}/token", server.uri());

        let config = AppConfig::builder()
            .registration(registration)
            .token_file(workdir.path().join("store").join(DEFAULT_TOKEN_FILE_NAME))
            .download_dir(workdir.path().join("downloads"))
            .drive_api_base(format!("{}/drive/v3", server.uri()))
            .chunk_size(CHUNK_ALIGNMENT)
            .retry_policy(RetryPolicy::no_retry())
            .http_client(Arc::new(ReqwestHttpClient::new().unwrap()))
            .file_system(Arc::new(TokioFileSystem::new()))
            .secure_store(secure_store)
            .build()
            .unwrap();

        Self {
            server,
            workdir,
            service: DriveFetchService::new(config).unwrap(),
        }
    }

    fn downloads(&self) -> std::path::PathBuf {
        self.workdir.path().join("downloads")
    }

    async fn mount_listing(&self, access_token: &str) {
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(header("Authorization", format!("Bearer {}", access_token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&self.server)
            .await;
    }

    async fn mount_content(&self) {
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/doc1/export"))
            .and(query_param("mimeType", "application/pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 report".to_vec()))
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files/bin1"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg bytes".to_vec()))
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                r#"{"error":{"code":404,"message":"File not found: gone","errors":[{"reason":"notFound","message":"File not found"}]}}"#,
            ))
            .mount(&self.server)
            .await;
    }
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_list_select_and_transfer() {
    let fixture = Fixture::new("ya29.valid").await;
    fixture.mount_listing("ya29.valid").await;
    fixture.mount_content().await;
    let service = &fixture.service;

    let entries = service.list_entries().await.unwrap();
    assert_eq!(entries.len(), 3);

    for id in ["doc1", "bin1", "gone"] {
        assert!(service.select(id, true).await.unwrap());
    }
    assert!(!service.select("doc1", true).await.unwrap());

    let mut handle = service.start_transfer_batch(fixture.downloads()).await.unwrap();
    let report = (&mut handle.report).await.unwrap();

    assert_eq!(report.summary().succeeded, 2);
    assert!(matches!(
        report.outcomes[2].result,
        Err(TransferError::NotFound(_))
    ));
    assert_eq!(
        listing(&fixture.downloads()),
        vec!["Report.pdf".to_string(), "photo.jpg".to_string()]
    );
    assert_eq!(
        std::fs::read(fixture.downloads().join("Report.pdf")).unwrap(),
        b"%PDF-1.7 report"
    );

    // Only the failed entry stays selected
    let remaining: Vec<_> = service
        .current_selection()
        .await
        .into_iter()
        .map(|entry| entry.remote_id)
        .collect();
    assert_eq!(remaining, vec!["gone"]);

    let mut terminal = 0;
    while let Ok(progress) = handle.progress.try_recv() {
        if progress.is_terminal() {
            terminal += 1;
        }
        if let TransferState::Complete { path } = &progress.state {
            assert!(path.starts_with(fixture.downloads()));
        }
    }
    assert_eq!(terminal, 3);
}

#[tokio::test]
async fn test_listing_renews_rejected_credential_once() -> anyhow::Result<()> {
    let fixture = Fixture::new("ya29.revoked").await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(header("Authorization", "Bearer ya29.revoked"))
        .respond_with(ResponseTemplate::new(401).set_body_string(
            r#"{"error":{"code":401,"message":"Invalid Credentials"}}"#,
        ))
        .expect(1)
        .mount(&fixture.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"access_token":"ya29.fresh","expires_in":3599,"token_type":"Bearer"}"#,
        ))
        .expect(1)
        .mount(&fixture.server)
        .await;
    fixture.mount_listing("ya29.fresh").await;

    let entries = fixture.service.list_entries().await?;

    assert_eq!(entries.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_select_requires_listed_entry() {
    let fixture = Fixture::new("ya29.valid").await;

    let result = fixture.service.select("doc1", true).await;

    assert!(matches!(result, Err(CoreError::UnknownEntry(id)) if id == "doc1"));
}

#[tokio::test]
async fn test_empty_listing() {
    let fixture = Fixture::new("ya29.valid").await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"files":[]}"#))
        .mount(&fixture.server)
        .await;

    assert!(fixture.service.list_entries().await.unwrap().is_empty());

    let handle = fixture
        .service
        .start_transfer_batch(fixture.downloads())
        .await
        .unwrap();
    let report = handle.report.await.unwrap();
    assert!(report.outcomes.is_empty());
}

#[tokio::test]
async fn test_second_batch_is_rejected_while_running() {
    let fixture = Fixture::new("ya29.valid").await;
    fixture.mount_listing("ya29.valid").await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/bin1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"slow".to_vec())
                .set_delay(std::time::Duration::from_millis(300)),
        )
        .mount(&fixture.server)
        .await;

    let service = &fixture.service;
    service.list_entries().await.unwrap();
    service.select("bin1", true).await.unwrap();

    let first = service.start_transfer_batch(fixture.downloads()).await.unwrap();
    let second = service.start_transfer_batch(fixture.downloads()).await;
    assert!(matches!(second, Err(CoreError::BatchInProgress)));

    assert!(first.report.await.unwrap().is_complete_success());
    let third = service.start_transfer_batch(fixture.downloads()).await.unwrap();
    assert!(third.report.await.unwrap().outcomes.is_empty());
}

#[tokio::test]
async fn test_sign_out_clears_state() -> anyhow::Result<()> {
    let fixture = Fixture::new("ya29.valid").await;
    fixture.mount_listing("ya29.valid").await;
    let service = &fixture.service;

    service.list_entries().await?;
    service.select("bin1", true).await?;
    assert!(service.is_signed_in().await?);

    service.sign_out().await?;

    assert!(!service.is_signed_in().await?);
    assert!(service.current_selection().await.is_empty());
    assert!(matches!(
        service.select("bin1", true).await,
        Err(CoreError::UnknownEntry(_))
    ));
    Ok(())
}

/// Grants a fixed token and counts how often consent was asked for.
#[derive(Default)]
struct CountingAuthorizer {
    calls: AtomicUsize,
}

#[async_trait]
impl InteractiveAuthorizer for CountingAuthorizer {
    async fn authorize(
        &self,
        _oauth: &OAuthFlowManager,
        _timeout: std::time::Duration,
    ) -> core_auth::Result<TokenGrant> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TokenGrant {
            access_token: "ya29.consented".to_string(),
            refresh_token: Some("1//consented".to_string()),
            expires_in: Some(3599),
            scope: None,
            token_type: Some("Bearer".to_string()),
        })
    }
}

async fn service_with_authorizer(
    workdir: &Path,
    authorizer: Arc<CountingAuthorizer>,
) -> DriveFetchService {
    let secure_store = Arc::new(FileSecureStore::new(workdir.join("store")));
    CredentialStore::new(secure_store.clone(), DEFAULT_TOKEN_FILE_NAME)
        .save(&Credential::new(
            "ya29.persisted",
            Some("1//refresh".to_string()),
            Utc::now() + Duration::hours(1),
            vec![],
        ))
        .await
        .unwrap();

    let http = Arc::new(ReqwestHttpClient::new().unwrap());
    let event_bus = EventBus::new(16);
    let oauth = OAuthFlowManager::new(
        OAuthConfig::from_registration(
            &ClientRegistration::new("client-id.apps.googleusercontent.com", None),
            vec![DRIVE_READONLY_SCOPE.to_string()],
        ),
        http.clone(),
    );
    let auth = AuthFlowController::new(
        CredentialStore::new(secure_store, DEFAULT_TOKEN_FILE_NAME),
        oauth,
        authorizer,
        Arc::new(SystemClock),
        event_bus.clone(),
    );
    let engine = TransferEngine::new(
        Arc::new(DriveMediaSource::new(http.clone())),
        Arc::new(TokioFileSystem::new()),
    );

    DriveFetchService::from_parts(ServiceParts {
        auth: Arc::new(auth),
        catalog: CatalogClient::new(http),
        engine: Arc::new(engine),
        event_bus,
        listing: ListingOptions::default(),
        download_dir: workdir.join("downloads"),
    })
}

#[tokio::test]
async fn test_sign_in_reuses_persisted_credential() {
    let workdir = tempfile::tempdir().unwrap();
    let authorizer = Arc::new(CountingAuthorizer::default());
    let service = service_with_authorizer(workdir.path(), authorizer.clone()).await;

    let credential = service.sign_in().await.unwrap();

    assert_eq!(credential.access_token, "ya29.persisted");
    assert_eq!(authorizer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reauthorize_always_asks_for_consent() {
    let workdir = tempfile::tempdir().unwrap();
    let authorizer = Arc::new(CountingAuthorizer::default());
    let service = service_with_authorizer(workdir.path(), authorizer.clone()).await;

    let credential = service.reauthorize().await.unwrap();

    assert_eq!(credential.access_token, "ya29.consented");
    assert_eq!(authorizer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        service.sign_in().await.unwrap().access_token,
        "ya29.consented"
    );
}
