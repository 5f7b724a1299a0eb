use std::fs;
use std::path::{Path, PathBuf};

fn collect_rs_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        if let Ok(read_dir) = fs::read_dir(&dir) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.extension().map(|e| e == "rs").unwrap_or(false) {
                    files.push(path);
                }
            }
        }
    }
    files
}

fn writers_of(src_root: &Path, needles: &[&str]) -> Vec<String> {
    collect_rs_files(src_root)
        .into_iter()
        .filter(|file| {
            fs::read_to_string(file)
                .map(|c| needles.iter().any(|n| c.contains(n)))
                .unwrap_or(false)
        })
        .map(|file| file.to_string_lossy().replace('\\', "/"))
        .collect()
}

fn assert_owned_by(table: &str, owner: &str) {
    let src = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src");
    let needles = [
        format!("INSERT INTO {}", table),
        format!("DELETE FROM {}", table),
        format!("UPDATE {}", table),
    ];
    let needles: Vec<&str> = needles.iter().map(String::as_str).collect();

    let offenders: Vec<String> = writers_of(&src, &needles)
        .into_iter()
        .filter(|path| !path.ends_with(owner))
        .collect();

    if !offenders.is_empty() {
        panic!("{} must only be written from {}. Offenders: {:?}", table, owner, offenders);
    }
}

#[test]
fn follow_edges_written_only_by_social_graph() {
    assert_owned_by("follows", "src/services/graph.rs");
}

#[test]
fn membership_written_only_by_band_repository() {
    assert_owned_by("band_members", "src/repository/bands.rs");
}

#[test]
fn posts_written_only_by_post_repository() {
    assert_owned_by("posts", "src/repository/posts.rs");
}
