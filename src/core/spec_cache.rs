//! 交易规则缓存
//! 每个交易所适配器持有一个实例，按 (交易所, 市场类型) 分区，读多写少

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::core::types::{ExchangeKey, Result, SymbolSpec};
use crate::{safe_lock, safe_read, safe_write};

/// 时间来源，测试中可替换为手动时钟
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动推进的时钟
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) -> Result<()> {
        let mut now = safe_lock!(self.now)?;
        *now += by;
        Ok(())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        // 锁中毒时仍然可以读出上次的值
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// 单个分区：失效时整体替换，不做原地清理
#[derive(Debug)]
struct SpecTable {
    specs: HashMap<String, Arc<SymbolSpec>>,
    refreshed_at: DateTime<Utc>,
}

impl SpecTable {
    fn empty(at: DateTime<Utc>) -> Self {
        Self {
            specs: HashMap::new(),
            refreshed_at: at,
        }
    }
}

/// 交易规则缓存
pub struct SpecCache {
    tables: RwLock<HashMap<ExchangeKey, SpecTable>>,
    clock: Arc<dyn Clock>,
}

impl Default for SpecCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl SpecCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// 查询交易规则，读者之间互不阻塞
    pub fn lookup(&self, key: ExchangeKey, symbol: &str) -> Result<Option<Arc<SymbolSpec>>> {
        let tables = safe_read!(self.tables)?;
        let found = tables
            .get(&key)
            .and_then(|table| table.specs.get(symbol))
            .cloned();

        if found.is_some() {
            debug!("规则缓存命中: {} {}", key, symbol);
        } else {
            debug!("规则缓存未命中: {} {}", key, symbol);
        }
        Ok(found)
    }

    /// 插入或覆盖单个交易对的规则
    pub fn populate(&self, key: ExchangeKey, symbol: &str, spec: SymbolSpec) -> Result<()> {
        let now = self.clock.now();
        let mut tables = safe_write!(self.tables)?;
        tables
            .entry(key)
            .or_insert_with(|| SpecTable::empty(now))
            .specs
            .insert(symbol.to_string(), Arc::new(spec));
        Ok(())
    }

    /// 在一次写锁内写入批量拉取的全部规则，并刷新时间戳
    pub fn populate_many(&self, key: ExchangeKey, specs: Vec<SymbolSpec>) -> Result<usize> {
        let now = self.clock.now();
        let mut tables = safe_write!(self.tables)?;
        let table = tables.entry(key).or_insert_with(|| SpecTable::empty(now));
        let count = specs.len();
        for spec in specs {
            table.specs.insert(spec.symbol.clone(), Arc::new(spec));
        }
        table.refreshed_at = now;
        drop(tables);

        info!("规则缓存写入 {} 条: {}", count, key);
        Ok(count)
    }

    /// 清空分区并记录清空时间
    pub fn invalidate(&self, key: ExchangeKey) -> Result<()> {
        let now = self.clock.now();
        let previous = {
            let mut tables = safe_write!(self.tables)?;
            tables.insert(key, SpecTable::empty(now))
        };

        let dropped = previous.map(|t| t.specs.len()).unwrap_or(0);
        info!("规则缓存已失效: {}，丢弃 {} 条", key, dropped);
        Ok(())
    }

    /// 分区超过 ttl 未刷新时清空，返回是否执行了清空
    pub fn invalidate_if_stale(&self, key: ExchangeKey, ttl: Duration) -> Result<bool> {
        let stale = match self.last_refresh(key)? {
            Some(at) => {
                let age = self.clock.now().signed_duration_since(at);
                age.to_std().map(|age| age >= ttl).unwrap_or(false)
            }
            None => false,
        };
        if stale {
            self.invalidate(key)?;
        }
        Ok(stale)
    }

    /// 最近一次批量刷新或清空的时间
    pub fn last_refresh(&self, key: ExchangeKey) -> Result<Option<DateTime<Utc>>> {
        let tables = safe_read!(self.tables)?;
        Ok(tables.get(&key).map(|t| t.refreshed_at))
    }

    /// 在同一个读锁内取出分区的全部规则
    pub fn snapshot(&self, key: ExchangeKey) -> Result<Vec<Arc<SymbolSpec>>> {
        let tables = safe_read!(self.tables)?;
        Ok(tables
            .get(&key)
            .map(|t| t.specs.values().cloned().collect())
            .unwrap_or_default())
    }

    pub fn len(&self, key: ExchangeKey) -> Result<usize> {
        let tables = safe_read!(self.tables)?;
        Ok(tables.get(&key).map(|t| t.specs.len()).unwrap_or(0))
    }
}

/// 启动定时失效任务
///
/// 每次失效完成后才重新计时，因此同一个任务的两次失效不会重叠。
pub fn spawn_invalidation_task(
    cache: Arc<SpecCache>,
    keys: Vec<ExchangeKey>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            for key in &keys {
                if let Err(e) = cache.invalidate(*key) {
                    error!("规则缓存定时失效失败 {}: {}", key, e);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::tests::sample_spec;
    use crate::core::types::{ExchangeId, MarketType};
    use chrono::TimeZone;

    fn binance_spot() -> ExchangeKey {
        ExchangeKey::new(ExchangeId::Binance, MarketType::Spot)
    }

    fn spec_named(symbol: &str, marker: &str) -> SymbolSpec {
        let mut spec = sample_spec();
        spec.symbol = symbol.to_string();
        spec.min_notional = marker.to_string();
        spec
    }

    #[test]
    fn test_populate_overwrites_in_place() {
        let cache = SpecCache::default();
        let key = binance_spot();

        cache.populate(key, "BTCUSDT", spec_named("BTCUSDT", "5")).unwrap();
        cache.populate(key, "BTCUSDT", spec_named("BTCUSDT", "10")).unwrap();

        assert_eq!(cache.len(key).unwrap(), 1);
        let spec = cache.lookup(key, "BTCUSDT").unwrap().unwrap();
        assert_eq!(spec.min_notional, "10");
    }

    #[test]
    fn test_invalidate_then_populate() {
        let cache = SpecCache::default();
        let key = binance_spot();
        let other = ExchangeKey::new(ExchangeId::Binance, MarketType::Futures);

        cache
            .populate_many(key, vec![spec_named("BTCUSDT", "1"), spec_named("ETHUSDT", "1")])
            .unwrap();
        cache.populate(other, "BTCUSDT", spec_named("BTCUSDT", "1")).unwrap();

        cache.invalidate(key).unwrap();
        assert!(cache.lookup(key, "BTCUSDT").unwrap().is_none());
        assert!(cache.lookup(key, "ETHUSDT").unwrap().is_none());
        // 其他分区不受影响
        assert!(cache.lookup(other, "BTCUSDT").unwrap().is_some());

        cache.populate(key, "BTCUSDT", spec_named("BTCUSDT", "2")).unwrap();
        let spec = cache.lookup(key, "BTCUSDT").unwrap().unwrap();
        assert_eq!(spec.min_notional, "2");
    }

    #[test]
    fn test_invalidate_if_stale_with_manual_clock() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let cache = SpecCache::new(clock.clone());
        let key = binance_spot();
        let ttl = Duration::from_secs(3600);

        cache.populate_many(key, vec![spec_named("BTCUSDT", "1")]).unwrap();
        assert_eq!(cache.last_refresh(key).unwrap(), Some(start));

        clock.advance(chrono::Duration::minutes(59)).unwrap();
        assert!(!cache.invalidate_if_stale(key, ttl).unwrap());
        assert!(cache.lookup(key, "BTCUSDT").unwrap().is_some());

        clock.advance(chrono::Duration::minutes(1)).unwrap();
        assert!(cache.invalidate_if_stale(key, ttl).unwrap());
        assert!(cache.lookup(key, "BTCUSDT").unwrap().is_none());
        assert_eq!(
            cache.last_refresh(key).unwrap(),
            Some(start + chrono::Duration::hours(1))
        );
    }

    #[test]
    fn test_no_torn_reads() {
        let cache = Arc::new(SpecCache::default());
        let key = binance_spot();
        let symbols: Vec<String> = (0..50).map(|i| format!("SYM{}USDT", i)).collect();

        let writer = {
            let cache = cache.clone();
            let symbols = symbols.clone();
            std::thread::spawn(move || {
                for generation in 0..200 {
                    cache.invalidate(key).unwrap();
                    let specs = symbols
                        .iter()
                        .map(|s| spec_named(s, &generation.to_string()))
                        .collect();
                    cache.populate_many(key, specs).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = cache.snapshot(key).unwrap();
                        if let Some(first) = snapshot.first() {
                            // 同一次读取里只能看到同一代的数据
                            assert_eq!(snapshot.len(), 50);
                            assert!(snapshot
                                .iter()
                                .all(|s| s.min_notional == first.min_notional));
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(cache.len(key).unwrap(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_task_rearms() {
        let cache = Arc::new(SpecCache::default());
        let key = binance_spot();
        let handle = spawn_invalidation_task(cache.clone(), vec![key], Duration::from_secs(3600));

        cache.populate(key, "BTCUSDT", sample_spec()).unwrap();
        tokio::time::sleep(Duration::from_secs(3599)).await;
        assert!(cache.lookup(key, "BTCUSDT").unwrap().is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(cache.lookup(key, "BTCUSDT").unwrap().is_none());

        // 第二个周期同样生效
        cache.populate(key, "BTCUSDT", sample_spec()).unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(cache.lookup(key, "BTCUSDT").unwrap().is_none());

        handle.abort();
    }
}
