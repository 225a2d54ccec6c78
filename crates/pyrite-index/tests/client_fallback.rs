//! Index failover behavior against local HTTP fixtures.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use pyrite_core::requirement::PackageName;
use pyrite_core::version::Version;
use pyrite_index::client::{build_client, IndexClient};
use pyrite_index::repository::PackageIndex;
use pyrite_resolver::provider::MetadataProvider;

/// Serve every request with one canned HTTP response.
async fn spawn_server(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(resp.as_bytes()).await;
            });
        }
    });
    format!("http://{addr}")
}

fn client_for(bad: &str, good: &str) -> IndexClient {
    let indexes = vec![
        PackageIndex::new("bad", bad),
        PackageIndex::new("good", good),
    ];
    IndexClient::new(build_client().unwrap(), indexes)
}

#[tokio::test]
async fn version_listing_skips_a_broken_index() {
    // 403 is a hard error for one index, not for the whole lookup.
    let bad = spawn_server("403 Forbidden", "denied").await;
    let good = spawn_server(
        "200 OK",
        r#"{"releases": {"1.0": [{"digests": {"sha256": "aa"}}]}}"#,
    )
    .await;
    let client = client_for(&bad, &good);

    let name = PackageName::new("foo").unwrap();
    let versions = client.list_versions(&name).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].to_string(), "1.0");
    assert_eq!(client.source_of(&name), good);
}

#[tokio::test]
async fn release_metadata_skips_a_broken_index() {
    let bad = spawn_server("403 Forbidden", "denied").await;
    let good = spawn_server(
        "200 OK",
        r#"{"info": {"requires_dist": ["idna>=2.5"]}, "urls": [{"digests": {"sha256": "aa"}}]}"#,
    )
    .await;
    let client = client_for(&bad, &good);

    // No prior version listing, so no recorded origin: the release lookup
    // walks the index list itself and must survive the broken one.
    let name = PackageName::new("foo").unwrap();
    let version = Version::parse("1.0").unwrap();

    let requires = client.dependencies(&name, &version).await.unwrap();
    assert_eq!(requires.len(), 1);
    assert_eq!(requires[0].name.as_str(), "idna");

    let hashes = client.integrity_hashes(&name, &version).await.unwrap();
    assert_eq!(hashes, vec!["sha256:aa"]);
    assert_eq!(client.source_of(&name), good);
}
