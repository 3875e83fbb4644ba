//! 设备驱动基础接口

use alloc::{string::String, sync::Arc};

use crate::block::BlockDriver;

/// 设备驱动程序特征
pub trait Driver: Send + Sync {
    /// 获取此设备的唯一标识符
    /// 每个实例的标识符应该不同
    fn get_id(&self) -> String;

    /// 将驱动程序转换为块设备驱动程序（如果适用）
    fn as_block(&self) -> Option<&dyn BlockDriver> {
        None
    }

    /// 将驱动程序转换为块设备驱动程序 Arc（如果适用）
    fn as_block_arc(self: Arc<Self>) -> Option<Arc<dyn BlockDriver>> {
        None
    }
}
