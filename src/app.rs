//! 启动流程
//!
//! 读取分区表，依次挂载并处理每个分区: 挂载成功才列目录，
//! 挂载失败只记录日志并继续下一个分区。

use embedded_storage::nor_flash::NorFlash;

use crate::fs::{mount, process_partition, MountSlot, MountTable, PartitionDescriptor, PartitionStorage, PartitionTable, Reporter};
use crate::sync::{with_flash, SharedFlash};
use crate::{log_error, log_info};

/// 从 Flash 读取分区表
///
/// 读取或解析失败时记录错误并返回空表，之后的挂载都会得到 `PartitionNotFound`。
pub fn load_partition_table<F: NorFlash>(flash: &SharedFlash<F>) -> PartitionTable {
    match with_flash(flash, |f| PartitionTable::read_from(f)) {
        Ok(table) => {
            log_info!("Partition table: {} entries", table.len());
            table
        }
        Err(e) => {
            log_error!("Failed to read partition table: {}", e.as_str());
            PartitionTable::new()
        }
    }
}

/// 依次挂载并处理 `plan` 中的分区，返回成功挂载的数量
pub fn run<'a, 'f: 'a, F, R, const BLOCKS: usize, const N: usize>(
    flash: &'f SharedFlash<F>,
    table: &PartitionTable,
    mounts: &mut MountTable<'a, PartitionStorage<'f, F, BLOCKS>, N>,
    plan: impl IntoIterator<Item = (PartitionDescriptor, &'a mut MountSlot<'f, F, BLOCKS>)>,
    reporter: &mut R,
) -> usize
where
    F: NorFlash,
    R: Reporter,
{
    log_info!("=== Dual Partition LittleFS Example ===");

    let mut mounted = 0;
    for (desc, slot) in plan {
        if mount(mounts, table, flash, slot, desc).is_ok() {
            mounted += 1;
            process_partition(mounts, desc.mount_point, reporter);
        }
    }

    log_info!("=== Done ===");
    mounted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PARTITION_A, PARTITION_B};
    use crate::fs::{ImageEntry, ProcessError};
    use crate::sync::shared_flash;
    use crate::testutil::{
        data_blocks, flash_with_table, populate, Event, RamFlash, Recorder, TEST_BLOCKS, TEST_PARTITIONS_CSV,
    };

    type TestTable<'a, 'f> = MountTable<'a, PartitionStorage<'f, RamFlash, TEST_BLOCKS>, 2>;

    #[test]
    fn test_notes_scenario() {
        let (flash, table) = flash_with_table(TEST_PARTITIONS_CSV);
        let flash = shared_flash(flash);
        populate(&flash, &table, "partitions_a", &[ImageEntry::File("notes.txt", b"hello\nworld\n")]);

        let mut slot_a = MountSlot::new();
        let mut slot_b = MountSlot::new();
        let mut mounts: TestTable<'_, '_> = MountTable::new();
        let mut recorder = Recorder::default();

        let mounted = run(
            &flash,
            &table,
            &mut mounts,
            [(PARTITION_A, &mut slot_a), (PARTITION_B, &mut slot_b)],
            &mut recorder,
        );

        assert_eq!(mounted, 2);
        let part_a = recorder.events_for("/part_a");
        assert_eq!(
            part_a,
            [
                Event::Listing("/part_a".into()),
                Event::Entry("notes.txt".into()),
                Event::Reading("/part_a/notes.txt".into()),
                Event::Line("hello".into()),
                Event::Line("world".into()),
            ]
        );
        // partitions_b 是空白分区: 格式化后没有条目
        assert_eq!(recorder.events_for("/part_b"), [Event::Listing("/part_b".into())]);
    }

    #[test]
    fn test_absent_partition_is_never_listed() {
        let csv = "partitions_a, data, littlefs, 0x10000, 128K,\n";
        let (flash, table) = flash_with_table(csv);
        let flash = shared_flash(flash);
        populate(&flash, &table, "partitions_a", &[ImageEntry::File("a.txt", b"only\n")]);

        let mut slot_a = MountSlot::new();
        let mut slot_b = MountSlot::new();
        let mut mounts: TestTable<'_, '_> = MountTable::new();
        let mut recorder = Recorder::default();

        let mounted = run(
            &flash,
            &table,
            &mut mounts,
            [(PARTITION_A, &mut slot_a), (PARTITION_B, &mut slot_b)],
            &mut recorder,
        );

        assert_eq!(mounted, 1);
        assert!(!mounts.is_mounted("/part_b"));
        assert!(!recorder.events.contains(&Event::Listing("/part_b".into())));
        assert_eq!(recorder.lines(), ["only"]);
    }

    #[test]
    fn test_every_entry_reported_once_and_only_txt_read() {
        let (flash, table) = flash_with_table(TEST_PARTITIONS_CSV);
        let flash = shared_flash(flash);
        populate(
            &flash,
            &table,
            "partitions_a",
            &[
                ImageEntry::File("a.txt", b"first\n"),
                ImageEntry::File(".txt", b"hidden\n"),
                ImageEntry::File("LOUD.TXT", b"shout\n"),
                ImageEntry::File("data.bin", b"\x00\x01"),
                ImageEntry::File("z.txt", b"last"),
                ImageEntry::Dir("logs.txt"),
            ],
        );

        let mut slot_a = MountSlot::new();
        let mut mounts: TestTable<'_, '_> = MountTable::new();
        let mut recorder = Recorder::default();

        run(&flash, &table, &mut mounts, [(PARTITION_A, &mut slot_a)], &mut recorder);

        let mut entries = recorder.entries();
        entries.sort();
        assert_eq!(entries, [".txt", "LOUD.TXT", "a.txt", "data.bin", "logs.txt", "z.txt"]);

        let mut lines = recorder.lines();
        lines.sort();
        assert_eq!(lines, ["first", "last"]);

        // 名为 logs.txt 的子目录通过过滤，但无法作为文件打开
        assert!(recorder
            .events
            .contains(&Event::Error(ProcessError::FileOpenFailed, "/part_a/logs.txt".into())));
    }

    #[test]
    fn test_partition_processed_after_capacity_failure() {
        let (flash, table) = flash_with_table(TEST_PARTITIONS_CSV);
        let flash = shared_flash(flash);
        let big = b"line\n".repeat(2_000);
        populate(
            &flash,
            &table,
            "partitions_a",
            &[
                ImageEntry::File("notes.txt", b"hello\nworld\n"),
                ImageEntry::File("big.txt", &big),
            ],
        );
        // 小文件内联在元数据块中，大文件的数据块不可读
        with_flash(&flash, |f| f.fail_reads_in(data_blocks(&table, "partitions_a")));

        let mut slot_a = MountSlot::new();
        let mut mounts: TestTable<'_, '_> = MountTable::new();
        let mut recorder = Recorder::default();

        let mounted = run(&flash, &table, &mut mounts, [(PARTITION_A, &mut slot_a)], &mut recorder);

        assert_eq!(mounted, 1);
        assert_eq!(recorder.events.first(), Some(&Event::Listing("/part_a".into())));
        assert_eq!(recorder.lines(), ["hello", "world"]);
        assert!(recorder.events.contains(&Event::Reading("/part_a/big.txt".into())));
        assert!(recorder
            .events
            .contains(&Event::Error(ProcessError::FileReadFailed, "/part_a/big.txt".into())));
    }

    #[test]
    fn test_unmounted_paths_fail_to_open() {
        let mounts: TestTable<'_, '_> = MountTable::new();
        let mut recorder = Recorder::default();

        process_partition(&mounts, "/part_x", &mut recorder);
        crate::fs::read_and_log(&mounts, "/part_x/missing.txt", &mut recorder);

        assert_eq!(
            recorder.events,
            [
                Event::Listing("/part_x".into()),
                Event::Error(ProcessError::DirectoryOpenFailed, "/part_x".into()),
                Event::Error(ProcessError::FileOpenFailed, "/part_x/missing.txt".into()),
            ]
        );
    }

    #[test]
    fn test_missing_file_on_mounted_partition() {
        let (flash, table) = flash_with_table(TEST_PARTITIONS_CSV);
        let flash = shared_flash(flash);

        let mut slot_a = MountSlot::new();
        let mut mounts: TestTable<'_, '_> = MountTable::new();
        mount(&mut mounts, &table, &flash, &mut slot_a, PARTITION_A).unwrap();

        let mut recorder = Recorder::default();
        crate::fs::read_and_log(&mounts, "/part_a/missing.txt", &mut recorder);

        assert_eq!(
            recorder.events,
            [Event::Error(ProcessError::FileOpenFailed, "/part_a/missing.txt".into())]
        );
    }

    #[test]
    fn test_blank_flash_yields_empty_table() {
        let flash = shared_flash(RamFlash::new(0x10000));
        assert!(load_partition_table(&flash).is_empty());
    }

    #[test]
    fn test_table_is_read_from_flash() {
        let (flash, _) = flash_with_table(TEST_PARTITIONS_CSV);
        let flash = shared_flash(flash);

        let table = load_partition_table(&flash);
        assert!(table.find_by_label("partitions_a").is_some());
        assert!(table.find_by_label("partitions_b").is_some());
    }
}
