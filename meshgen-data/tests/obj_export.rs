use glam::{Vec2, Vec3};
use meshgen_data::{
    ColoredMesh, ExportError, MeshOutput, TextureMap, TexturedMesh, UvAtlas, write_mesh,
};
use std::fs;
use std::path::PathBuf;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("meshgen-data-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn textured_triangle() -> TexturedMesh {
    let atlas = UvAtlas::pack(1, 8);
    let mut texture = TextureMap::new(8, 8);
    texture.set(2, 2, [1.0, 0.5, 0.0]);
    TexturedMesh {
        vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
        faces: vec![[0, 1, 2]],
        uvs: atlas.uvs,
        uv_faces: atlas.uv_faces,
        texture,
    }
}

#[test]
fn test_textured_export_writes_obj_mtl_and_png() {
    let dir = scratch_dir("textured");
    let path = dir.join("mesh.obj");

    write_mesh(&MeshOutput::Textured(textured_triangle()), &path).unwrap();

    let obj = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = obj.lines().collect();
    assert_eq!(lines[0], "mtllib mesh.mtl");
    assert_eq!(lines[1], "v 0.000000 0.000000 0.000000");
    assert_eq!(lines[2], "v 1.000000 0.000000 0.000000");
    assert!(lines[4].starts_with("vt "));
    assert_eq!(lines[7], "usemtl material_0");
    assert_eq!(lines[8], "f 1/1 2/2 3/3");

    let mtl = fs::read_to_string(dir.join("mesh.mtl")).unwrap();
    assert!(mtl.starts_with("newmtl material_0\n"));
    assert!(mtl.contains("Ks 0.4 0.4 0.4\n"));
    assert!(mtl.contains("map_Kd mesh.png\n"));

    let png = image::open(dir.join("mesh.png")).unwrap().to_rgb8();
    assert_eq!(png.dimensions(), (8, 8));
    // Texel (2, 2) lands on row 8 - 1 - 2 after the vertical flip.
    assert_eq!(png.get_pixel(2, 5).0, [255, 127, 0]);

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_colored_export_mirrors_z_and_reverses_faces() {
    let dir = scratch_dir("colored");
    let path = dir.join("colored.obj");
    let mesh = ColoredMesh {
        vertices: vec![Vec3::new(0.0, 0.0, 1.0), Vec3::X, Vec3::Y],
        faces: vec![[0, 1, 2]],
        colors: vec![[255, 0, 0], [0, 255, 0], [0, 0, 255]],
    };

    write_mesh(&MeshOutput::Colored(mesh), &path).unwrap();

    let obj = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = obj.lines().collect();
    assert_eq!(
        lines[0],
        "v 0.000000 0.000000 -1.000000 1.000000 0.000000 0.000000"
    );
    assert_eq!(lines[3], "f 3 2 1");
    assert!(!dir.join("colored.mtl").exists());

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_inconsistent_mesh_is_rejected() {
    let dir = scratch_dir("inconsistent");
    let mut mesh = textured_triangle();
    mesh.uv_faces.clear();

    let result = write_mesh(&MeshOutput::Textured(mesh), &dir.join("bad.obj"));
    assert!(matches!(result, Err(ExportError::Inconsistent(_))));

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_missing_parent_directory_is_created() {
    let dir = scratch_dir("nested");
    let path = dir.join("a").join("b").join("mesh.obj");

    write_mesh(&MeshOutput::Textured(textured_triangle()), &path).unwrap();
    assert!(path.exists());

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_uvs_are_written_with_six_decimals() {
    let dir = scratch_dir("uvs");
    let path = dir.join("uv.obj");
    let mut mesh = textured_triangle();
    mesh.uvs = vec![Vec2::new(0.25, 0.5), Vec2::new(0.75, 0.5), Vec2::new(0.5, 1.0)];

    write_mesh(&MeshOutput::Textured(mesh), &path).unwrap();
    let obj = fs::read_to_string(&path).unwrap();
    assert!(obj.contains("vt 0.250000 0.500000\n"));

    fs::remove_dir_all(dir).unwrap();
}
