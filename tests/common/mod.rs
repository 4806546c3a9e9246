//! Shared fixtures: image archives and root filesystems built at test time.

#![allow(dead_code)]

use idiff_rs::image::{Image, ImageMetadata};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

/// Builds an uncompressed layer tar from `(path, contents)` pairs.
pub fn layer(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(1_600_000_000);
        builder
            .append_data(&mut header, path, data.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap()
}

/// Builds a layer holding one symlink `path -> target`.
pub fn symlink_layer(path: &str, target: &Path) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_size(0);
    header.set_mode(0o777);
    builder.append_link(&mut header, path, target).unwrap();
    builder.into_inner().unwrap()
}

/// Builds a layer whose single entry name is written verbatim, bypassing the
/// builder's path checks.
pub fn raw_entry_layer(name: &str, data: &str) -> Vec<u8> {
    let mut header = tar::Header::new_old();
    header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append(&header, data.as_bytes()).unwrap();
    builder.into_inner().unwrap()
}

fn append(builder: &mut tar::Builder<fs::File>, path: &str, data: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(1_600_000_000);
    builder.append_data(&mut header, path, data).unwrap();
}

/// Config blob with the given history and env.
pub fn config_json(history: &[&str], env: &[&str]) -> String {
    let history: Vec<_> = history.iter().map(|h| json!({ "created_by": h })).collect();
    json!({
        "config": { "Env": env },
        "history": history,
        "rootfs": { "type": "layers", "diff_ids": [] }
    })
    .to_string()
}

/// Writes a `docker save` style archive to `dir/name`.
pub fn saved_image(
    dir: &Path,
    name: &str,
    history: &[&str],
    env: &[&str],
    layers: &[Vec<u8>],
) -> PathBuf {
    let path = dir.join(name);
    let mut builder = tar::Builder::new(fs::File::create(&path).unwrap());

    append(&mut builder, "cafebabe.json", config_json(history, env).as_bytes());
    let layer_paths: Vec<String> = (0..layers.len())
        .map(|i| format!("layer{}/layer.tar", i))
        .collect();
    for (layer_path, data) in layer_paths.iter().zip(layers) {
        append(&mut builder, layer_path, data);
    }
    let manifest = json!([{
        "Config": "cafebabe.json",
        "RepoTags": [format!("{}:latest", name)],
        "Layers": layer_paths,
    }]);
    append(&mut builder, "manifest.json", manifest.to_string().as_bytes());

    builder.finish().unwrap();
    path
}

/// Writes an archive whose top level holds arbitrary files.
pub fn flat_archive(dir: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, layer(files)).unwrap();
    path
}

/// Creates files below `root`, making parent directories as needed.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    fs::create_dir_all(root).unwrap();
    for (path, contents) in files {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
}

/// Wraps an existing directory as an image.
pub fn image_at(root: &Path, history: &[&str], env: &[&str]) -> Image {
    Image::new(
        root.display().to_string(),
        root,
        ImageMetadata {
            history: history.iter().map(|s| s.to_string()).collect(),
            env: env.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        },
    )
}
