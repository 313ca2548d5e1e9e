//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic `/proc/diskstats` and `/sys` block
//! hierarchies for testing classification and collection.

use super::filesystem::MockFs;

const SATA_HOST: &str = "/sys/devices/pci0000:00/0000:00:17.0";
const NVME_NS: &str = "/sys/devices/pci0000:00/0000:00:1d.0/0000:3d:00.0/nvme/nvme0/nvme0n1";
const VIRTUAL_BLOCK: &str = "/sys/devices/virtual/block";

/// Queue of a SATA hard disk with every attribute present.
const HDD_QUEUE: &[(&str, &str)] = &[
    ("discard_granularity", "0"),
    ("hw_sector_size", "512"),
    ("io_poll", "0"),
    ("io_poll_delay", "-1"),
    ("io_timeout", "30000"),
    ("iostats", "1"),
    ("logical_block_size", "512"),
    ("max_hw_sectors_kb", "32767"),
    ("max_sectors_kb", "1280"),
    ("minimum_io_size", "4096"),
    ("nomerges", "0"),
    ("optimal_io_size", "0"),
    ("physical_block_size", "4096"),
    ("read_ahead_kb", "128"),
    ("rotational", "1"),
    ("rq_affinity", "1"),
    ("scheduler", "[mq-deadline] kyber bfq none"),
    ("write_cache", "write back"),
];

/// Queue of an NVMe namespace with every attribute present.
const NVME_QUEUE: &[(&str, &str)] = &[
    ("discard_granularity", "512"),
    ("hw_sector_size", "512"),
    ("io_poll", "1"),
    ("io_poll_delay", "-1"),
    ("io_timeout", "30000"),
    ("iostats", "1"),
    ("logical_block_size", "512"),
    ("max_hw_sectors_kb", "2048"),
    ("max_sectors_kb", "1280"),
    ("minimum_io_size", "512"),
    ("nomerges", "0"),
    ("optimal_io_size", "0"),
    ("physical_block_size", "512"),
    ("read_ahead_kb", "128"),
    ("rotational", "0"),
    ("rq_affinity", "1"),
    ("scheduler", "[none] mq-deadline"),
    ("write_cache", "write back"),
];

/// Stacked (md/dm) devices expose a reduced queue.
const STACKED_QUEUE: &[(&str, &str)] = &[
    ("hw_sector_size", "512"),
    ("logical_block_size", "512"),
    ("max_sectors_kb", "1280"),
    ("minimum_io_size", "4096"),
    ("optimal_io_size", "0"),
    ("physical_block_size", "4096"),
    ("read_ahead_kb", "6144"),
    ("rotational", "1"),
    ("scheduler", "none"),
];

impl MockFs {
    /// Adds a block device directory with `dev`, `size` and `inflight`
    /// files and its `/sys/dev/block/<devnum>` symlink.
    pub fn add_block_device(&mut self, device_path: &str, devnum: &str, size: u64) {
        self.add_file(format!("{}/dev", device_path), format!("{}\n", devnum));
        self.add_file(format!("{}/size", device_path), format!("{}\n", size));
        self.add_file(
            format!("{}/inflight", device_path),
            "       0        0\n",
        );
        let relative = device_path.strip_prefix("/sys/").unwrap_or(device_path);
        self.add_symlink(
            format!("/sys/dev/block/{}", devnum),
            format!("../../{}", relative),
        );
    }

    /// Adds a partition: a block device carrying the `partition` marker.
    pub fn add_partition(&mut self, device_path: &str, devnum: &str, number: u32, size: u64) {
        self.add_block_device(device_path, devnum, size);
        self.add_file(
            format!("{}/partition", device_path),
            format!("{}\n", number),
        );
    }

    /// Adds `queue/<name>` files under `device_path`.
    pub fn add_queue(&mut self, device_path: &str, attributes: &[(&str, &str)]) {
        for (name, value) in attributes {
            self.add_file(
                format!("{}/queue/{}", device_path, name),
                format!("{}\n", value),
            );
        }
    }

    /// Adds a `slaves/<name>` link from a stacked device to a member.
    pub fn add_slave(&mut self, device_path: &str, slave_name: &str, slave_path: &str) {
        self.add_symlink(format!("{}/slaves/{}", device_path, slave_name), slave_path);
    }

    /// Replaces `/proc/diskstats`.
    pub fn set_diskstats(&mut self, content: &str) {
        self.set_file("/proc/diskstats", content);
    }

    /// A host with two SATA disks, an NVMe namespace, an md RAID1 across
    /// `sda2`/`sdb1`, an LVM volume on `nvme0n1p2`, loop and ram devices,
    /// and `sdc` whose device-number link dangles.
    pub fn typical_host() -> Self {
        let mut fs = Self::new();

        fs.set_diskstats(
            "\
   8       0 sda 6812071 23231120 460799263 43073497 9561353 55255999 547604986 81837974 0 93365790 124928542 0 0 0 0 1120 410
   8       1 sda1 1200 300 98000 700 400 80 52000 350 0 900 1050 0 0 0 0 0 0
   8       2 sda2 6810000 23230000 460600000 43070000 9560000 55250000 547500000 81830000 0 93360000 124900000 0 0 0 0 0 0
   8      16 sdb 5123456 120000 380000000 39000000 9000000 51000000 530000000 79000000 2 90000000 120000000 0 0 0 0 1090 400
   8      17 sdb1 5120000 119000 379000000 38900000 8990000 50900000 529000000 78900000 2 89900000 119900000 0 0 0 0 0 0
   8      32 sdc 10 0 80 3 0 0 0 0 0 3 3 0 0 0 0 0 0
 259       0 nvme0n1 107146 2852 19971336 23647 181355 11090 15833592 22852 0 66784 92500 13669 0 1758032920 52066
 259       1 nvme0n1p1 240 0 9830 21 2 0 8 0 0 40 21 0 0 0 0
 259       2 nvme0n1p2 106800 2852 19960000 23600 181350 11090 15833500 22850 0 66700 92400 13669 0 1758032920 52066
   9     127 md127 222424 0 48560354 0 333649 0 37421048 0 0 0 0 13669 0 3515818192 0
 253       0 dm-0 106500 0 19950000 24100 192400 0 15833000 25400 0 67000 49500 13600 0 1758000000 1200 0 0
   7       0 loop0 55 0 1234 10 0 0 0 0 0 20 10 0 0 0 0
   1       0 ram0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0
",
        );

        let sda = format!("{}/ata1/host0/target0:0:0/0:0:0:0/block/sda", SATA_HOST);
        fs.add_block_device(&sda, "8:0", 3907029168);
        fs.add_queue(&sda, HDD_QUEUE);
        fs.add_partition(&format!("{}/sda1", sda), "8:1", 1, 1050624);
        fs.add_partition(&format!("{}/sda2", sda), "8:2", 2, 3905976320);

        let sdb = format!("{}/ata2/host1/target1:0:0/1:0:0:0/block/sdb", SATA_HOST);
        fs.add_block_device(&sdb, "8:16", 3907029168);
        fs.add_queue(&sdb, HDD_QUEUE);
        fs.add_partition(&format!("{}/sdb1", sdb), "8:17", 1, 3907027120);

        // sdc was hot-removed; its devnum link survives, the target is gone
        fs.add_symlink(
            "/sys/dev/block/8:32",
            "../../devices/pci0000:00/0000:00:17.0/ata3/host2/target2:0:0/2:0:0:0/block/sdc",
        );

        fs.add_block_device(NVME_NS, "259:0", 1000215216);
        fs.add_queue(NVME_NS, NVME_QUEUE);
        fs.add_partition(&format!("{}/nvme0n1p1", NVME_NS), "259:1", 1, 1048576);
        fs.add_partition(&format!("{}/nvme0n1p2", NVME_NS), "259:2", 2, 999164559);

        let md = format!("{}/md127", VIRTUAL_BLOCK);
        fs.add_block_device(&md, "9:127", 3905974272);
        fs.add_queue(&md, STACKED_QUEUE);
        fs.add_file(format!("{}/md/level", md), "raid1\n");
        fs.add_slave(&md, "sda2", &format!("{}/sda2", sda));
        fs.add_slave(&md, "sdb1", &format!("{}/sdb1", sdb));

        let dm = format!("{}/dm-0", VIRTUAL_BLOCK);
        fs.add_block_device(&dm, "253:0", 999161856);
        fs.add_queue(&dm, STACKED_QUEUE);
        fs.add_file(format!("{}/dm/name", dm), "vg0-root\n");
        fs.add_slave(&dm, "nvme0n1p2", &format!("{}/nvme0n1p2", NVME_NS));

        fs
    }

    /// An older kernel: legacy 11-counter diskstats, no `io_poll_delay` or
    /// `write_cache`, and an unreadable `io_timeout`.
    pub fn legacy_kernel() -> Self {
        let mut fs = Self::new();

        fs.set_diskstats(
            "\
   8       0 sda 6812071 23231120 460799263 43073497 9561353 55255999 547604986 81837974 0 93365790 124928542
   8       1 sda1 6810000 23230000 460600000 43070000 9560000 55250000 547500000 81830000 0 93360000 124900000
",
        );

        let sda = format!("{}/ata1/host0/target0:0:0/0:0:0:0/block/sda", SATA_HOST);
        fs.add_block_device(&sda, "8:0", 976773168);
        let queue: Vec<(&str, &str)> = HDD_QUEUE
            .iter()
            .copied()
            .filter(|(name, _)| !matches!(*name, "io_poll_delay" | "write_cache" | "io_timeout"))
            .collect();
        fs.add_queue(&sda, &queue);
        fs.add_unreadable(format!("{}/queue/io_timeout", sda));
        fs.add_partition(&format!("{}/sda1", sda), "8:1", 1, 976771072);

        fs
    }

    /// `typical_host` with garbage lines mixed into `/proc/diskstats`.
    pub fn with_malformed_diskstats() -> Self {
        let mut fs = Self::typical_host();
        fs.set_diskstats(
            "\
   8       0 sda 6812071 23231120 460799263 43073497 9561353 55255999 547604986 81837974 0 93365790 124928542 0 0 0 0 1120 410
   8       1 sda1 1200 300 98000
 259       0 nvme0n1 107146 2852 19971336 23647 181355 11090 15833592 22852 0 66784 92500 13669 0 1758032920 52066
 259       1 nvme0n1p1 240 0 9830 21 2 0 8 0 0 40 21 0 0 0 0 0
   x       2 sda2 1 2 3 4 5 6 7 8 9 10 11
   9     127 md127 222424 0 48560354 0 333649 0 37421048 0 0 0 0 13669 0 3515818192 0
",
        );
        fs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::traits::FileSystem;
    use std::path::Path;

    #[test]
    fn test_typical_host_has_required_files() {
        let fs = MockFs::typical_host();
        assert!(fs.exists(Path::new("/proc/diskstats")));
        assert!(fs.exists(Path::new("/sys/dev/block/8:0")));
        assert!(fs.exists(Path::new("/sys/dev/block/259:1/partition")));
        assert!(fs.exists(Path::new("/sys/dev/block/9:127/md/level")));
        assert!(!fs.exists(Path::new("/sys/dev/block/8:32")));
    }

    #[test]
    fn test_typical_host_devnum_links_match_dev_files() {
        let fs = MockFs::typical_host();
        for devnum in ["8:0", "8:1", "8:17", "259:0", "259:2", "9:127", "253:0"] {
            let dev = fs
                .read_to_string(&Path::new("/sys/dev/block").join(devnum).join("dev"))
                .unwrap();
            assert_eq!(dev.trim(), devnum);
        }
    }

    #[test]
    fn test_legacy_kernel_has_unreadable_attribute() {
        let fs = MockFs::legacy_kernel();
        let err = fs
            .read_to_string(Path::new("/sys/dev/block/8:0/queue/io_timeout"))
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::PermissionDenied);
    }
}
