use serde_json::json;
use timelapse::catalog::Catalog;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn fetches_and_resolves_products() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gallery/product.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "sat": "INSAT-3DR",
                "sensor": [{
                    "sen": "IMAGER",
                    "type": [{
                        "product": "Special",
                        "prodlist": [{"prod": "Blended Image", "pat": "3RIMG_*_BLEND_V*.jpg"}]
                    }]
                }]
            }
        ])))
        .mount(&server)
        .await;

    let url = format!("{}/gallery/product.json", server.uri());
    let catalog = Catalog::fetch(&reqwest::Client::new(), &url).await.unwrap();

    let product = catalog
        .resolve("INSAT-3DR/IMAGER/Special/Blended Image")
        .unwrap();
    assert_eq!(product.pattern, "3RIMG_*_BLEND_V*.jpg");
    assert_eq!(product.extension, "jpg");
    assert_eq!(catalog.leaves().len(), 1);
}

#[tokio::test]
async fn http_errors_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let result = Catalog::fetch(&reqwest::Client::new(), &server.uri()).await;
    assert!(result.is_err());
}
