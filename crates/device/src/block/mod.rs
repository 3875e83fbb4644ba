//! 块设备模块
//!
//! 包含块设备驱动接口、内存盘实现，以及缓冲区缓存使用的设备表。

mod ram_disk;

use alloc::{sync::Arc, vec::Vec};
use sync::SpinLock;

use crate::driver::Driver;

pub use ram_disk::RamDisk;

/// 块设备驱动程序接口
///
/// 读写都是同步的整块传输：返回时数据已经到达目的地。
pub trait BlockDriver: Driver {
    /// 读取块设备数据
    /// # 参数：
    /// * `block_id` - 块设备的块号
    /// * `buf` - 用于存储读取数据的缓冲区，长度必须等于 [`BlockDriver::block_size`]
    /// # 返回值：
    /// 如果读取成功则返回 true，否则返回 false
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> bool;

    /// 写入块设备数据
    /// # 参数：
    /// * `block_id` - 块设备的块号
    /// * `buf` - 包含要写入数据的缓冲区，长度必须等于 [`BlockDriver::block_size`]
    /// # 返回值：
    /// 如果写入成功则返回 true，否则返回 false
    fn write_block(&self, block_id: usize, buf: &[u8]) -> bool;

    /// 获取块大小（字节）
    fn block_size(&self) -> usize;

    /// 获取总块数
    fn total_blocks(&self) -> usize;
}

/// 设备表操作错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// 设备号已被占用
    AlreadyRegistered,
    /// 驱动不是块设备
    NotBlockDevice,
}

/// 设备号到块设备驱动的映射表
///
/// 表本身由自旋锁保护；查找时只克隆 `Arc` 后立即释放锁，
/// 真正的磁盘传输在锁外进行。
pub struct BlockDevices {
    devices: SpinLock<Vec<(u32, Arc<dyn BlockDriver>)>>,
}

impl BlockDevices {
    /// 创建空设备表
    pub const fn new() -> Self {
        Self {
            devices: SpinLock::new(Vec::new(), "blkdev"),
        }
    }

    /// 以设备号 `dev` 注册一个块设备驱动
    pub fn register(&self, dev: u32, driver: Arc<dyn BlockDriver>) -> Result<(), DeviceError> {
        let mut devices = self.devices.lock();
        if devices.iter().any(|(id, _)| *id == dev) {
            return Err(DeviceError::AlreadyRegistered);
        }
        log::info!(
            "blkdev: dev {} -> {} ({} blocks of {} bytes)",
            dev,
            driver.get_id(),
            driver.total_blocks(),
            driver.block_size()
        );
        devices.push((dev, driver));
        Ok(())
    }

    /// 注册一个通用驱动，要求它能转换为块设备
    pub fn register_driver(&self, dev: u32, driver: Arc<dyn Driver>) -> Result<(), DeviceError> {
        let block = driver.as_block_arc().ok_or(DeviceError::NotBlockDevice)?;
        self.register(dev, block)
    }

    /// 按设备号查找驱动
    pub fn get(&self, dev: u32) -> Option<Arc<dyn BlockDriver>> {
        self.devices
            .lock()
            .iter()
            .find(|(id, _)| *id == dev)
            .map(|(_, driver)| Arc::clone(driver))
    }

    /// 已注册的设备数
    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    /// 设备表是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 在设备 `dev` 与 `buf` 之间同步传输一整块
    ///
    /// # Panics
    /// 设备不存在、`buf` 长度与块大小不符或驱动报告失败时 panic：
    /// 本层不建模 I/O 错误。
    pub fn transfer(&self, dev: u32, blockno: u32, buf: &mut [u8], write: bool) {
        let Some(driver) = self.get(dev) else {
            panic!("blkdev: no device {}", dev);
        };
        if buf.len() != driver.block_size() {
            panic!(
                "blkdev: dev {} block size {} but buffer is {} bytes",
                dev,
                driver.block_size(),
                buf.len()
            );
        }
        let ok = if write {
            driver.write_block(blockno as usize, buf)
        } else {
            driver.read_block(blockno as usize, buf)
        };
        if !ok {
            log::error!(
                "blkdev: {} of dev {} block {} failed",
                if write { "write" } else { "read" },
                dev,
                blockno
            );
            panic!("blkdev: transfer failed");
        }
    }
}

impl Default for BlockDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_env::init_sync_ops;
    use alloc::string::String;

    struct NotABlock;

    impl Driver for NotABlock {
        fn get_id(&self) -> String {
            String::from("serial_0")
        }
    }

    #[test]
    fn test_register_and_transfer() {
        init_sync_ops();
        let table = BlockDevices::new();
        assert!(table.is_empty());
        table.register(1, RamDisk::new(4096, 1024, 1)).unwrap();
        assert_eq!(table.len(), 1);

        let mut block = [0u8; 1024];
        block[0] = 0x42;
        table.transfer(1, 2, &mut block, true);

        let mut back = [0u8; 1024];
        table.transfer(1, 2, &mut back, false);
        assert_eq!(back[0], 0x42);
    }

    #[test]
    fn test_register_rejects_duplicates_and_non_block() {
        init_sync_ops();
        let table = BlockDevices::new();
        table.register(7, RamDisk::new(1024, 512, 7)).unwrap();
        assert_eq!(
            table.register(7, RamDisk::new(1024, 512, 8)),
            Err(DeviceError::AlreadyRegistered)
        );
        assert_eq!(
            table.register_driver(9, Arc::new(NotABlock)),
            Err(DeviceError::NotBlockDevice)
        );
        let rd: Arc<dyn Driver> = RamDisk::new(1024, 512, 9);
        assert!(table.register_driver(9, rd).is_ok());
        assert!(table.get(9).is_some());
    }

    #[test]
    #[should_panic(expected = "no device")]
    fn test_transfer_unknown_device_panics() {
        init_sync_ops();
        let table = BlockDevices::new();
        let mut block = [0u8; 512];
        table.transfer(3, 0, &mut block, false);
    }

    #[test]
    #[should_panic(expected = "block size")]
    fn test_transfer_wrong_block_size_panics() {
        init_sync_ops();
        let table = BlockDevices::new();
        table.register(1, RamDisk::new(4096, 1024, 1)).unwrap();
        let mut small = [0u8; 512];
        table.transfer(1, 0, &mut small, false);
    }
}
