//! dualfs - ESP32-S3 双 LittleFS 分区诊断固件
//!
//! 上电后等待串口监视器连接，挂载 `partitions_a` / `partitions_b` 两个 LittleFS 分区，
//! 列出各自根目录并输出其中 `.txt` 文件的内容，随后进入空闲循环。
//!
//! 硬件目标: ESP32-S3 (分区布局见 partitions.csv)
//!
//! ```text
//! cargo run --release --features dev --target xtensa-esp32s3-none-elf
//! ```

#![no_std]
#![no_main]

use dualfs::config::{IDLE_PERIOD_MS, MAX_MOUNTS, PARTITION_A, PARTITION_B, PARTITION_BLOCKS, STARTUP_DELAY_MS};
use dualfs::{app, log_info, shared_flash, LogReporter, MountSlot, MountTable, PartitionStorage, SharedFlash};
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_hal::timer::timg::TimerGroup;
use esp_storage::FlashStorage;
use static_cell::StaticCell;

// ===== ESP-IDF 兼容 App Descriptor =====
esp_bootloader_esp_idf::esp_app_desc!();

// ===== defmt 全局日志器 (RTT) =====
#[cfg(feature = "log-defmt")]
use defmt_rtt as _;

// ===== Panic Handler =====
#[cfg(any(feature = "dev", feature = "log-println"))]
use esp_backtrace as _;

#[cfg(not(any(feature = "dev", feature = "log-println")))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {
        core::hint::spin_loop();
    }
}

type FirmwareStorage<'f> = PartitionStorage<'f, FlashStorage<'static>, PARTITION_BLOCKS>;

// ===== 静态分配 =====
/// 两个分区共享的 SPI Flash
static FLASH: StaticCell<SharedFlash<FlashStorage<'static>>> = StaticCell::new();

// ===== 主入口点 =====
#[esp_rtos::main]
async fn main(_spawner: Spawner) {
    // ========================================
    // 1. 硬件初始化
    // ========================================
    let peripherals = esp_hal::init(esp_hal::Config::default());

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // ========================================
    // 2. 等待 USB 串口监视器连接
    // ========================================
    Timer::after(Duration::from_millis(STARTUP_DELAY_MS)).await;
    log_info!("{} v{} starting on ESP32-S3", dualfs::NAME, dualfs::VERSION);

    // ========================================
    // 3. 挂载并处理两个分区
    // ========================================
    // littlefs 的缓存区不是 Send，挂载槽只能放在 main 的栈帧里: main 永不返回，
    // 文件系统在整个运行期间保持挂载
    let flash: &'static SharedFlash<_> = FLASH.init(shared_flash(FlashStorage::new(peripherals.FLASH)));
    let table = app::load_partition_table(flash);

    let mut slot_a = MountSlot::new();
    let mut slot_b = MountSlot::new();
    let mut mounts: MountTable<'_, FirmwareStorage<'_>, MAX_MOUNTS> = MountTable::new();

    app::run(
        flash,
        &table,
        &mut mounts,
        [(PARTITION_A, &mut slot_a), (PARTITION_B, &mut slot_b)],
        &mut LogReporter,
    );

    // ========================================
    // 4. 空闲循环
    // ========================================
    loop {
        Timer::after(Duration::from_millis(IDLE_PERIOD_MS)).await;
    }
}
