use std::env;

fn main() {
    // 告诉 cargo 在 build.rs 或分区表变化时重新运行
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=partitions.csv");

    // 宿主机 (单元测试) 不需要 esp-hal 的链接脚本
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    if target_arch != "xtensa" {
        return;
    }

    // esp-hal 1.0 通过 linkall.x 汇总全部链接脚本
    println!("cargo:rustc-link-arg-bins=-Tlinkall.x");
}
