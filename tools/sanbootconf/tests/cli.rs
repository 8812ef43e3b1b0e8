#![cfg(not(target_arch = "wasm32"))]

use std::net::Ipv4Addr;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use sanboot_firmware::builder::{AbftBuilder, IbftBuilder, NicSpec, TargetSpec};
use sanboot_firmware::scan::{BASEMEM_LEN, BASEMEM_START};
use sanboot_firmware::{MacAddr, VecMemory};
use tempfile::tempdir;

const MAC: MacAddr = MacAddr([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);

fn sanbootconf() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sanbootconf"));
    cmd.env_remove("SANBOOTCONF_LOG_LEVEL")
        .env_remove("SANBOOTCONF_LOAD_OPTIONS");
    cmd
}

fn ibft() -> Vec<u8> {
    IbftBuilder::new()
        .nic(NicSpec {
            ip: Ipv4Addr::new(10, 0, 0, 5),
            prefix: 24,
            gateway: Ipv4Addr::new(10, 0, 0, 1),
            mac: MAC,
            ..Default::default()
        })
        .target(TargetSpec {
            ip: Ipv4Addr::new(10, 0, 0, 50),
            name: "iqn.2010-04.org.ipxe:disk".into(),
            chap_name: "initiator".into(),
            chap_secret: "s3cr3t-password".into(),
            ..Default::default()
        })
        .build()
}

/// Writes a window image starting at the scanned base, with `tables` placed at
/// the given physical addresses.
fn write_image(path: &Path, tables: &[(u64, &[u8])]) {
    let mut mem = VecMemory::new(BASEMEM_START, BASEMEM_LEN);
    for (paddr, table) in tables {
        mem.write_physical(*paddr, table);
    }
    let mut image = vec![0u8; BASEMEM_LEN];
    mem.read_physical(BASEMEM_START, &mut image).unwrap();
    std::fs::write(path, image).unwrap();
}

#[test]
fn help_lists_subcommands() {
    sanbootconf()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("export"));
}

#[test]
fn scan_empty_image_reports_nothing() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("mem.bin");
    write_image(&image, &[]);

    sanbootconf()
        .args(["scan", "--base", "0x80000", "--image"])
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains("No SAN boot method detected"));
}

#[test]
fn scan_rejects_image_outside_window() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("mem.bin");
    std::fs::write(&image, vec![0u8; 4096]).unwrap();

    sanbootconf()
        .args(["scan", "--image"])
        .arg(&image)
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not include"));
}

#[test]
fn scan_missing_image_fails() {
    let dir = tempdir().unwrap();
    sanbootconf()
        .args(["scan", "--image"])
        .arg(dir.path().join("absent.bin"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read memory image"));
}

#[test]
fn scan_prints_dump_and_configures_interface() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("mem.bin");
    write_image(&image, &[(0x9_f000, &ibft())]);

    sanbootconf()
        .args(["scan", "--base", "0x80000", "--image"])
        .arg(&image)
        .args(["--interface", "52:54:00:12:34:56={IF-0}"])
        .assert()
        .success()
        .stdout(predicate::str::contains("boot: iSCSI boot via iPXE"))
        .stdout(predicate::str::contains("IP = 10.0.0.5/255.255.255.0"))
        .stdout(predicate::str::contains(
            "Amended gateway for iBFT NIC 0 from 10.0.0.1 to 10.0.0.50",
        ))
        .stdout(predicate::str::contains("NIC 52:54:00:12:34:56 is interface {IF-0}"))
        .stdout(predicate::str::contains("SAN boot detected"))
        .stdout(predicate::str::contains("s3cr3t").not())
        .stderr(predicate::str::contains("s3cr3t").not());
}

#[test]
fn noguiboot_hides_boot_text() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("mem.bin");
    write_image(&image, &[(0x9_f000, &ibft())]);

    sanbootconf()
        .args(["scan", "--base", "0x80000", "--load-options", "/NOGUIBOOT", "--image"])
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains("boot:").not());
}

#[test]
fn load_options_are_read_from_environment() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("mem.bin");
    write_image(&image, &[(0x9_f000, &ibft())]);

    sanbootconf()
        .env("SANBOOTCONF_LOAD_OPTIONS", "/FASTDETECT /NOGUIBOOT")
        .args(["scan", "--base", "0x80000", "--image"])
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains("boot:").not())
        .stdout(predicate::str::contains("SAN boot detected"));
}

#[test]
fn scan_json_redacts_secrets() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("mem.bin");
    write_image(&image, &[(0x9_f000, &ibft())]);

    let output = sanbootconf()
        .args(["scan", "--json", "--base", "0x80000", "--image"])
        .arg(&image)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let text = json.to_string();
    assert!(!text.contains("s3cr3t"));
    assert!(text.contains("<omitted>"));
    assert_eq!(json["gateway_changes"][0]["new"], "10.0.0.50");
}

#[test]
fn export_writes_table_bytes() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("mem.bin");
    let abft = AbftBuilder::new(4, 1, MAC).build();
    write_image(&image, &[(0x8_8000, &abft)]);
    let out = dir.path().join("abft.bin");

    sanbootconf()
        .args(["export", "--table", "abft", "--base", "524288", "--image"])
        .arg(&image)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();
    assert_eq!(std::fs::read(&out).unwrap(), abft);

    sanbootconf()
        .args(["export", "--table", "abft", "--max-len", "12", "--base", "0x80000", "--image"])
        .arg(&image)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote 12 bytes"));
    assert_eq!(std::fs::read(&out).unwrap(), &abft[..12]);
}

#[test]
fn export_of_absent_table_fails() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("mem.bin");
    write_image(&image, &[]);

    sanbootconf()
        .args(["export", "--table", "sbft", "--base", "0x80000", "--image"])
        .arg(&image)
        .arg("--out")
        .arg(dir.path().join("sbft.bin"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot export sBFT"));
}
