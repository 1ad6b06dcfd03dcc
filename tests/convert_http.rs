//! End-to-end HTTP tests against the real router.

use std::io::{Cursor, Read, Write};

use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use macroscrub::{AppState, Config, build_router};

fn test_server(config: Config) -> TestServer {
    TestServer::new(build_router(AppState { config })).expect("Failed to create test server")
}

fn default_server() -> TestServer {
    test_server(Config::default())
}

/// Build a minimal macro-enabled workbook package. `marker` lands in the
/// worksheet so outputs of different uploads can be told apart.
fn build_xlsm(marker: &str) -> Vec<u8> {
    let content_types = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Default Extension="bin" ContentType="application/vnd.ms-office.vbaProject"/>
  <Override PartName="/xl/workbook.xml" ContentType="application/vnd.ms-excel.sheet.macroEnabled.main+xml"/>
  <Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
  <Override PartName="/xl/vbaProject.bin" ContentType="application/vnd.ms-office.vbaProject"/>
</Types>"#;
    let root_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;
    let workbook = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#;
    let workbook_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.microsoft.com/office/2006/relationships/vbaProject" Target="vbaProject.bin"/>
</Relationships>"#;
    let sheet = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData><row r="1"><c r="A1"><v>{marker}</v></c></row></sheetData>
</worksheet>"#
    );

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    let entries: [(&str, &[u8]); 6] = [
        ("[Content_Types].xml", content_types.as_bytes()),
        ("_rels/.rels", root_rels.as_bytes()),
        ("xl/workbook.xml", workbook.as_bytes()),
        ("xl/_rels/workbook.xml.rels", workbook_rels.as_bytes()),
        ("xl/worksheets/sheet1.xml", sheet.as_bytes()),
        ("xl/vbaProject.bin", b"\xd0\xcf\x11\xe0dummy-vba-project"),
    ];
    for (name, data) in entries {
        writer.start_file(name.to_string(), options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn upload_form(filename: &str, bytes: Vec<u8>) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(bytes)
            .file_name(filename)
            .mime_type("application/octet-stream"),
    )
}

/// Read the entry names and one entry's contents from zip bytes.
fn zip_entry(bytes: &[u8], wanted: &str) -> (Vec<String>, Option<String>) {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let contents = match archive.by_name(wanted) {
        Ok(mut entry) => {
            let mut text = String::new();
            entry.read_to_string(&mut text).unwrap();
            Some(text)
        }
        Err(_) => None,
    };
    (names, contents)
}

#[tokio::test]
async fn api_upload_returns_macro_free_attachment() {
    let server = default_server();

    let response = server
        .post("/api/remove-macro")
        .multipart(upload_form("budget.xlsm", build_xlsm("42")))
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.header("content-type"),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
    // Parentheses and spaces are outside attr-char, so they arrive encoded.
    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename*=UTF-8''budget%20%28macros%20removed%29.xlsx"
    );

    let (names, sheet) = zip_entry(response.as_bytes(), "xl/worksheets/sheet1.xml");
    assert!(!names.iter().any(|n| n == "xl/vbaProject.bin"));
    assert!(sheet.unwrap().contains("42"));

    let (_, content_types) = zip_entry(response.as_bytes(), "[Content_Types].xml");
    let content_types = content_types.unwrap();
    assert!(!content_types.contains("macroEnabled"));
    assert!(!content_types.contains("vbaProject"));
}

#[tokio::test]
async fn form_upload_returns_attachment() {
    let server = default_server();

    let response = server
        .post("/")
        .multipart(upload_form("report.xlsm", build_xlsm("7")))
        .await;

    response.assert_status_ok();
    let disposition = response.header("content-disposition");
    let encoded = disposition
        .to_str()
        .unwrap()
        .strip_prefix("attachment; filename*=UTF-8''")
        .unwrap()
        .to_string();
    let decoded = percent_encoding::percent_decode_str(&encoded)
        .decode_utf8()
        .unwrap();
    assert_eq!(decoded, "report (macros removed).xlsx");
}

#[tokio::test]
async fn form_failure_redirects_with_flash() {
    let server = default_server();

    let response = server
        .post("/")
        .multipart(upload_form("report.xlsx", b"whatever".to_vec()))
        .await;

    response.assert_status(axum::http::StatusCode::SEE_OTHER);
    let location = response.header("location");
    let location = location.to_str().unwrap();
    assert!(location.starts_with("/?error="), "location was {location}");

    // Following the redirect renders the message on the page.
    let query = location.strip_prefix("/?").unwrap();
    let (_, encoded) = query.split_once('=').unwrap();
    let message = percent_encoding::percent_decode_str(encoded)
        .decode_utf8()
        .unwrap();
    let page = server.get("/").add_query_param("error", &message).await;
    page.assert_status_ok();
    assert!(page.text().contains("not a .xlsm file"));
}

#[tokio::test]
async fn api_rejects_wrong_extension() {
    let server = default_server();

    let response = server
        .post("/api/remove-macro")
        .multipart(upload_form("report.xlsx", build_xlsm("1")))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("not a .xlsm file"));
}

#[tokio::test]
async fn api_rejects_missing_file_part() {
    let server = default_server();

    let response = server
        .post("/api/remove-macro")
        .multipart(MultipartForm::new().add_text("note", "no file here"))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "No file part in the request");
}

#[tokio::test]
async fn api_rejects_upload_without_filename() {
    let server = default_server();

    let response = server
        .post("/api/remove-macro")
        .multipart(MultipartForm::new().add_part("file", Part::bytes(build_xlsm("1"))))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "No file selected");
}

#[tokio::test]
async fn api_reports_conversion_failure_on_corrupt_upload() {
    let server = default_server();

    let response = server
        .post("/api/remove-macro")
        .multipart(upload_form("broken.xlsm", b"not actually a zip".to_vec()))
        .await;

    response.assert_status(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json();
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .contains("Could not remove macros")
    );
}

#[tokio::test]
async fn api_rejects_oversized_upload() {
    let server = test_server(Config {
        max_upload_bytes: 1024,
        ..Config::default()
    });

    let response = server
        .post("/api/remove-macro")
        .multipart(upload_form("big.xlsm", vec![0u8; 64 * 1024]))
        .await;

    response.assert_status(axum::http::StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn non_ascii_filename_gets_rfc5987_header() {
    let server = default_server();

    let response = server
        .post("/api/remove-macro")
        .multipart(upload_form("データ.xlsm", build_xlsm("9")))
        .await;

    response.assert_status_ok();
    let disposition = response.header("content-disposition");
    let disposition = disposition.to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename*=UTF-8''"));
    assert!(disposition.contains("%E3%83%87%E3%83%BC%E3%82%BF"));
}

#[tokio::test]
async fn concurrent_uploads_do_not_mix_outputs() {
    let server = default_server();

    let first = server
        .post("/api/remove-macro")
        .multipart(upload_form("alpha.xlsm", build_xlsm("alpha-contents")));
    let second = server
        .post("/api/remove-macro")
        .multipart(upload_form("beta.xlsm", build_xlsm("beta-contents")));

    let (first, second) = tokio::join!(async { first.await }, async { second.await });

    first.assert_status_ok();
    second.assert_status_ok();

    let (_, first_sheet) = zip_entry(first.as_bytes(), "xl/worksheets/sheet1.xml");
    let (_, second_sheet) = zip_entry(second.as_bytes(), "xl/worksheets/sheet1.xml");
    assert!(first_sheet.unwrap().contains("alpha-contents"));
    assert!(second_sheet.unwrap().contains("beta-contents"));
}

#[tokio::test]
async fn healthz_is_up() {
    let server = default_server();

    let response = server.get("/healthz").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "OK");
}
