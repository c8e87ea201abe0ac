use std::process::Command;

fn main() {
    // 获取 git 版本信息
    let git_hash = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    // 将版本信息传递给编译器
    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rerun-if-changed=.git/HEAD");

    if std::env::var("CARGO_FEATURE_ONNX").is_ok() && std::env::var("ORT_DYLIB_PATH").is_err() {
        println!("cargo:warning=ORT_DYLIB_PATH not set, onnxruntime will be looked up at runtime");
    }
}
