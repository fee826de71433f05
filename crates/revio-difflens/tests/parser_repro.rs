use revio_difflens::parser::parse_unified_diff;
use std::path::PathBuf;

#[test]
fn parse_patch_without_git_header() {
    let diff = "\
--- /dev/null
+++ b/examples/bad_code.rs
@@ -0,0 +1,13 @@
+fn main() {
+    println!(\"hello\");
+}
";
    let files = parse_unified_diff(diff).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].new_path, PathBuf::from("examples/bad_code.rs"));
    assert!(files[0].is_new_file);
    assert_eq!(files[0].hunks[0].old_lines, 0);
}

#[test]
fn concatenated_plain_patches_split_into_files() {
    let diff = "\
--- a/one.rs
+++ b/one.rs
@@ -1,2 +1,2 @@
-let a = 1;
+let a = 2;
 done();
--- a/two.rs
+++ b/two.rs
@@ -4 +4 @@
-x
+y
";
    let files = parse_unified_diff(diff).unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].new_path, PathBuf::from("one.rs"));
    assert_eq!(files[1].new_path, PathBuf::from("two.rs"));
    assert_eq!(files[1].hunks[0].new_start, 4);
}
