//! 同步原语封装
//!
//! 统一使用 CriticalSectionRawMutex，确保在 ESP32-S3 单核/双核环境下的正确性。
//! 挂载/读取流程本身是同步阻塞的，因此这里只需要阻塞式互斥锁。

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

/// 临界区阻塞互斥锁
///
/// `lock` 在临界区内执行闭包，闭包内不能 await。
pub type CriticalBlockingMutex<T> = Mutex<CriticalSectionRawMutex, T>;

/// 共享 Flash 设备
///
/// 两个 LittleFS 分区位于同一颗 SPI Flash 上，各自的存储适配器
/// 都持有同一个 `&SharedFlash`，每次读/写/擦除时短暂借用设备。
///
/// # Example
/// ```ignore
/// let flash = shared_flash(FlashStorage::new(peripherals.FLASH));
/// let table = with_flash(&flash, |f| PartitionTable::read_from(f));
/// ```
pub type SharedFlash<F> = CriticalBlockingMutex<RefCell<F>>;

/// 包装 Flash 设备
pub const fn shared_flash<F>(flash: F) -> SharedFlash<F> {
    Mutex::new(RefCell::new(flash))
}

/// 在临界区内以可变引用访问 Flash 设备
///
/// 闭包内不得再次调用 `with_flash` (RefCell 会拒绝重入借用)。
#[inline]
pub fn with_flash<F, R>(shared: &SharedFlash<F>, f: impl FnOnce(&mut F) -> R) -> R {
    shared.lock(|cell| f(&mut cell.borrow_mut()))
}
