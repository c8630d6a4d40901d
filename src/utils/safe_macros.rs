//! 锁获取宏：锁中毒时记录日志并转换为 `ExchangeError::Other`，不 panic

/// 安全的读锁获取
#[macro_export]
macro_rules! safe_read {
    ($rwlock:expr) => {
        $rwlock.read().map_err(|e| {
            log::error!("获取读锁失败: {}", e);
            $crate::core::error::ExchangeError::Other(format!("读锁已中毒: {}", e))
        })
    };
}

/// 安全的写锁获取
#[macro_export]
macro_rules! safe_write {
    ($rwlock:expr) => {
        $rwlock.write().map_err(|e| {
            log::error!("获取写锁失败: {}", e);
            $crate::core::error::ExchangeError::Other(format!("写锁已中毒: {}", e))
        })
    };
}

/// 安全的互斥锁获取
#[macro_export]
macro_rules! safe_lock {
    ($mutex:expr) => {
        $mutex.lock().map_err(|e| {
            log::error!("获取互斥锁失败: {}", e);
            $crate::core::error::ExchangeError::Other(format!("互斥锁已中毒: {}", e))
        })
    };
}
