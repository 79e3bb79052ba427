//! Directory and archive classpath entries

use std::fs;
use std::io::Write;

use class_loader::{
    BootstrapResolver, ClassLoader, Classpath, ClasspathResolver, DirectoryResolver, JarResolver,
};
use classfile::{ClassAccess, ClassWriter};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

fn class_bytes(name: &str) -> Vec<u8> {
    ClassWriter::new(name, Some("java/lang/Object"), ClassAccess::PUBLIC).to_bytes()
}

fn write_jar(path: &std::path::Path, entries: &[(&str, Vec<u8>)]) {
    let file = fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    for (name, bytes) in entries {
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(*name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

#[test]
fn test_directory_resolver_reads_nested_packages() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("demo/util")).unwrap();
    fs::write(dir.path().join("demo/util/Tool.class"), class_bytes("demo/util/Tool")).unwrap();

    let resolver = DirectoryResolver::new(dir.path());
    assert_eq!(
        resolver.find_class("demo/util/Tool").unwrap(),
        Some(class_bytes("demo/util/Tool"))
    );
    assert_eq!(resolver.find_class("demo/util/Missing").unwrap(), None);
}

#[test]
fn test_jar_resolver_reads_entries() {
    let dir = tempfile::tempdir().unwrap();
    let jar = dir.path().join("lib.jar");
    write_jar(&jar, &[("demo/Packed.class", class_bytes("demo/Packed"))]);

    let resolver = JarResolver::open(&jar).unwrap();
    assert_eq!(
        resolver.find_class("demo/Packed").unwrap(),
        Some(class_bytes("demo/Packed"))
    );
    assert_eq!(resolver.find_class("demo/Absent").unwrap(), None);
    assert_eq!(resolver.path(), jar.as_path());
}

#[test]
fn test_corrupt_archive_is_skipped_lazily() {
    let dir = tempfile::tempdir().unwrap();
    let jar = dir.path().join("broken.jar");
    fs::write(&jar, b"not a zip archive").unwrap();
    assert!(JarResolver::open(&jar).is_err());
    assert_eq!(JarResolver::new(&jar).find_class("demo/A").unwrap(), None);
}

#[test]
fn test_loader_over_parsed_classpath() {
    let dir = tempfile::tempdir().unwrap();
    let classes = dir.path().join("classes");
    fs::create_dir_all(classes.join("demo")).unwrap();
    fs::write(classes.join("demo/Main.class"), class_bytes("demo/Main")).unwrap();
    let jar = dir.path().join("dep.jar");
    write_jar(&jar, &[("demo/Dep.class", class_bytes("demo/Dep"))]);

    let joined = std::env::join_paths([classes.as_path(), jar.as_path()]).unwrap();
    let classpath = Classpath::parse(joined.to_str().unwrap());
    assert_eq!(classpath.len(), 2);

    let loader = ClassLoader::new(BootstrapResolver::new(classpath));
    assert_eq!(loader.resolve("demo/Main").unwrap().name(), "demo/Main");
    assert_eq!(loader.resolve("demo/Dep").unwrap().name(), "demo/Dep");
    assert!(loader.resolve("java/lang/Object").is_ok());
}
