//! server.properties 편집 플로우 통합 테스트
//!
//! 디스크 위의 실제 파일을 상대로 load → set → save 세션을 반복하며
//! 주석, 줄 순서, 비정형 라인이 끝까지 보존되는지 검증한다.

use mcwarden_core::properties::{PropertiesDocument, PropertiesError};

const VANILLA_SAMPLE: &str = "\
#Minecraft server properties
#Mon Aug 24 21:00:00 KST 2026
enable-jmx-monitoring=false
rcon.port=25575
gamemode=survival
motd=A Minecraft Server

server-port=25565
white-list=false
";

fn write_sample(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("server.properties");
    std::fs::write(&path, VANILLA_SAMPLE).unwrap();
    path
}

#[test]
fn test_untouched_roundtrip_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sample(&dir);

    let doc = PropertiesDocument::load(&path).unwrap();
    doc.save(&path).unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), VANILLA_SAMPLE);
    println!("✓ Untouched load → save reproduced the file byte for byte");
}

#[test]
fn test_edit_rewrites_only_the_edited_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("server.properties");
    std::fs::write(&path, "a=1\n#note\nb=2\n").unwrap();

    let mut doc = PropertiesDocument::load(&path).unwrap();
    doc.set("b", "3");
    doc.save(&path).unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "a=1\n#note\nb=3\n");
    println!("✓ Edit changed exactly one line");
}

#[tokio::test]
async fn test_sequential_edit_sessions_do_not_lose_updates() {
    // 세션마다 디스크에서 새로 읽기 때문에 앞 세션의 편집이 뒤 세션에 보인다
    let dir = tempfile::tempdir().unwrap();
    let path = write_sample(&dir);

    // 세션 1: 포트 변경
    let mut doc = PropertiesDocument::load(&path).unwrap();
    doc.set("server-port", "25600");
    doc.save(&path).unwrap();

    // 세션 2: motd 변경
    let mut doc = PropertiesDocument::load(&path).unwrap();
    doc.set("motd", "Warden test server");
    doc.save(&path).unwrap();

    let merged = PropertiesDocument::load(&path).unwrap();
    assert_eq!(merged.get("server-port"), Some("25600"));
    assert_eq!(merged.get("motd"), Some("Warden test server"));

    // 편집하지 않은 주석과 빈 줄은 그대로
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("#Minecraft server properties\n"));
    assert!(text.contains("\n\nserver-port=25600\n"));
    println!("✓ Two edit sessions kept both changes and every comment");
}

#[test]
fn test_save_leaves_no_temp_file_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sample(&dir);

    let mut doc = PropertiesDocument::load(&path).unwrap();
    doc.set("white-list", "true");
    doc.save(&path).unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["server.properties".to_string()]);
    println!("✓ Save left a single file, no temp remnants");
}

#[test]
fn test_failed_save_leaves_source_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sample(&dir);

    let mut doc = PropertiesDocument::load(&path).unwrap();
    doc.set("server-port", "1");

    // 대상 디렉터리가 없으면 저장은 실패하고 원본은 그대로
    let bad = dir.path().join("missing-subdir").join("server.properties");
    match doc.save(&bad) {
        Err(PropertiesError::Write { .. }) => {}
        other => panic!("expected Write error, got {:?}", other),
    }
    assert_eq!(std::fs::read_to_string(&path).unwrap(), VANILLA_SAMPLE);
    println!("✓ Failed save did not touch the original file");
}

#[test]
fn test_duplicate_keys_resolve_to_last_occurrence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("server.properties");
    std::fs::write(&path, "level-seed=1\nlevel-seed=2\n").unwrap();

    let mut doc = PropertiesDocument::load(&path).unwrap();
    assert_eq!(doc.get("level-seed"), Some("2"));
    assert_eq!(
        doc.entries(),
        vec![("level-seed".to_string(), "2".to_string())]
    );

    doc.set("level-seed", "3");
    doc.save(&path).unwrap();
    // 마지막 줄만 갱신되고 앞의 중복 줄은 보존된다
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "level-seed=1\nlevel-seed=3\n"
    );
    println!("✓ Duplicate keys resolve to the last occurrence");
}

#[test]
fn test_missing_file_is_reported_as_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("server.properties");
    match PropertiesDocument::load(&path) {
        Err(PropertiesError::NotFound { path: reported }) => assert_eq!(reported, path),
        other => panic!("expected NotFound, got {:?}", other.map(|d| d.render())),
    }
    println!("✓ Missing file reports NotFound with its path");
}

#[test]
fn test_malformed_lines_survive_editing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("server.properties");
    std::fs::write(&path, "good=1\nthis line has no equals\n  #indented comment\n").unwrap();

    let mut doc = PropertiesDocument::load(&path).unwrap();
    doc.set("good", "2");
    doc.set("added", "later");
    doc.save(&path).unwrap();

    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "good=2\nthis line has no equals\n  #indented comment\nadded=later\n"
    );
    println!("✓ Malformed lines survived an edit, new key appended at the end");
}
