use linked_hash_map::LinkedHashMap;

/// Returns the allocated memory in bytes.
pub trait ByteSize {
    /// Returns the amount of memory in bytes which is accounted for this value.
    ///
    /// For byte sequences this is the number of payload bytes. Bookkeeping fields like the
    /// length or capacity of the underlying buffer are not taken into account.
    fn allocated_size(&self) -> usize;
}

impl ByteSize for String {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

/// Invoked for each entry being evicted from a cache, once it has been removed.
pub type EvictionCallback<V> = Box<dyn Fn(&str, &V) + Send>;

/// Provides a memory constrained LRU cache.
///
/// A cache behaves just like a **Map** as long as there is no shortage in storage. However, if
/// the allocated memory is above the given limit, old (least recently used) entries will be
/// evicted - hence the name LRU cache. A limit of **0** disables eviction entirely.
///
/// # Examples
/// ```
/// # use ringcache::lru::LruCache;
/// // Specifies a cache which can store up to 1024 bytes of keys and values...
/// let mut lru = LruCache::new(1024);
///
/// lru.put("Foo".to_owned(), "Bar".to_owned());
/// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
///
/// // this will still fit..
/// lru.put("Foo1".to_owned(), "X".repeat(512));
/// assert_eq!(lru.get("Foo").is_some(), true);
/// assert_eq!(lru.get("Foo1").is_some(), true);
///
/// // this will hit the max memory constraint...
/// lru.put("Foo2".to_owned(), "X".repeat(512));
/// // ..and therefore will throw the two others out:
/// assert_eq!(lru.get("Foo").is_some(), false);
/// assert_eq!(lru.get("Foo1").is_some(), false);
/// assert_eq!(lru.get("Foo2").is_some(), true);
///```
pub struct LruCache<V: ByteSize> {
    allocated_memory: usize,
    max_memory: usize,
    reads: usize,
    hits: usize,
    writes: usize,
    evictions: usize,
    on_evicted: Option<EvictionCallback<V>>,
    map: LinkedHashMap<String, Entry<V>>,
}

struct Entry<V: ByteSize> {
    mem_size: usize,
    value: V,
}

impl<V: ByteSize> LruCache<V> {
    /// Creates a new cache which keeps entries until they allocated **max_memory** bytes.
    ///
    /// Passing **0** creates an unbounded cache.
    pub fn new(max_memory: usize) -> Self {
        LruCache {
            allocated_memory: 0,
            max_memory,
            reads: 0,
            hits: 0,
            writes: 0,
            evictions: 0,
            on_evicted: None,
            map: LinkedHashMap::new(),
        }
    }

    /// Creates a new cache which notifies the given callback for each evicted entry.
    ///
    /// # Examples
    /// ```
    /// # use ringcache::lru::LruCache;
    /// # use std::sync::{Arc, Mutex};
    /// let evicted = Arc::new(Mutex::new(Vec::new()));
    /// let log = evicted.clone();
    /// let mut lru = LruCache::with_eviction_callback(
    ///     9,
    ///     Box::new(move |key: &str, _: &String| log.lock().unwrap().push(key.to_owned())),
    /// );
    ///
    /// lru.put("key1".to_owned(), "1".to_owned());
    /// lru.put("key2".to_owned(), "2".to_owned());
    ///
    /// assert_eq!(*evicted.lock().unwrap(), vec!["key1".to_owned()]);
    /// ```
    pub fn with_eviction_callback(max_memory: usize, on_evicted: EvictionCallback<V>) -> Self {
        let mut cache = LruCache::new(max_memory);
        cache.on_evicted = Some(on_evicted);

        cache
    }

    /// Stores the given value for the given key.
    ///
    /// If the key is already present, its value is replaced and the entry becomes the most
    /// recently used one. Afterwards, least recently used entries are evicted until the cache
    /// fits into its memory budget again. Note that an entry which alone exceeds the budget
    /// will therefore evict all other entries and finally itself.
    ///
    /// # Examples
    /// ```
    /// # use ringcache::lru::LruCache;
    /// let mut lru = LruCache::new(1024);
    ///
    /// lru.put("Foo".to_owned(), "Bar".to_owned());
    /// assert_eq!(lru.allocated_memory(), 6);
    ///
    /// lru.put("Foo".to_owned(), "Bar12".to_owned());
    /// assert_eq!(lru.allocated_memory(), 8);
    /// assert_eq!(lru.len(), 1);
    ///```
    pub fn put(&mut self, key: String, value: V) {
        let entry = Entry {
            mem_size: key.len() + value.allocated_size(),
            value,
        };

        self.allocated_memory += entry.mem_size;
        if let Some(stale_entry) = self.map.insert(key, entry) {
            self.allocated_memory -= stale_entry.mem_size;
        }

        self.writes += 1;
        self.enforce_constraints();
    }

    fn enforce_constraints(&mut self) {
        while self.max_memory > 0 && self.allocated_memory > self.max_memory {
            if self.remove_oldest().is_none() {
                return;
            }
        }
    }

    /// Evicts the least recently used entry and returns it.
    ///
    /// The eviction callback (if present) is invoked after the entry has been removed.
    ///
    /// # Examples
    /// ```
    /// # use ringcache::lru::LruCache;
    /// let mut lru = LruCache::new(0);
    ///
    /// lru.put("A".to_owned(), "1".to_owned());
    /// lru.put("B".to_owned(), "2".to_owned());
    ///
    /// assert_eq!(lru.remove_oldest(), Some(("A".to_owned(), "1".to_owned())));
    /// assert_eq!(lru.len(), 1);
    /// ```
    pub fn remove_oldest(&mut self) -> Option<(String, V)> {
        let (key, entry) = self.map.pop_front()?;
        self.allocated_memory -= entry.mem_size;
        self.evictions += 1;

        if let Some(on_evicted) = &self.on_evicted {
            on_evicted(&key, &entry.value);
        }

        Some((key, entry.value))
    }

    /// Returns the value which has previously been stored for the given key or **None** if
    /// no value is present.
    ///
    /// A successful lookup marks the entry as the most recently used one.
    ///
    /// # Examples
    /// ```
    /// # use ringcache::lru::LruCache;
    /// let mut lru = LruCache::new(1024);
    ///
    /// // After inserting a value...
    /// lru.put("Foo".to_owned(), "Bar".to_owned());
    /// // ..it can be retrieved.
    /// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
    /// assert_eq!(lru.get("Unknown"), None);
    ///```
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.reads += 1;

        match self.map.get_refresh(key) {
            Some(entry) => {
                self.hits += 1;
                Some(&entry.value)
            }
            None => None,
        }
    }

    /// Returns the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Determines if the cache is completely empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the maximal amount of memory to be occupied by this cache.
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// Specifies the maximal amount of memory to be occupied by this cache.
    ///
    /// If the limit is reduced, superfluous entries are evicted immediately.
    ///
    /// # Examples
    /// ```
    /// # use ringcache::lru::LruCache;
    /// let mut lru = LruCache::new(1024);
    ///
    /// // Add some entries...
    /// lru.put("Foo0".to_owned(), "Bar".to_owned());
    /// lru.put("Foo1".to_owned(), "Bar".to_owned());
    /// lru.put("Foo2".to_owned(), "Bar".to_owned());
    /// lru.put("Foo3".to_owned(), "Bar".to_owned());
    /// assert_eq!(lru.len(), 4);
    ///
    /// // Now request that the cache is reduced to only 14 bytes...
    /// lru.set_max_memory(14);
    /// assert_eq!(lru.max_memory(), 14);
    ///
    /// // .. this will kick each but the last two entries out of the cache..
    /// assert_eq!(lru.len(), 2);
    /// ```
    pub fn set_max_memory(&mut self, max_memory: usize) {
        self.max_memory = max_memory;
        self.enforce_constraints();
    }

    /// Returns the amount of memory allocated by the keys and values of this cache in bytes.
    pub fn allocated_memory(&self) -> usize {
        self.allocated_memory
    }

    /// Returns the memory utilization in percent or 0 for an unbounded cache.
    pub fn memory_utilization(&self) -> f32 {
        match self.max_memory {
            0 => 0.,
            max => self.allocated_memory as f32 / max as f32 * 100.,
        }
    }

    /// Returns the cache hit rate in percent.
    pub fn hit_rate(&self) -> f32 {
        match self.reads {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }

    /// Returns the total number of reads performed on this cache.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Returns the total number of writes performed on this cache.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Returns the total number of entries evicted from this cache.
    pub fn evictions(&self) -> usize {
        self.evictions
    }
}

#[cfg(test)]
mod tests {
    use crate::lru::LruCache;
    use std::sync::{Arc, Mutex};

    #[test]
    fn max_memory_is_enforced() {
        let mut lru = LruCache::new(12 * 4);

        // We expect 4 entries with a size of 12 bytes each to fully fit in the cache....
        lru.put("Hello0".to_owned(), "World0".to_owned());
        lru.put("Hello1".to_owned(), "World1".to_owned());
        lru.put("Hello2".to_owned(), "World2".to_owned());
        lru.put("Hello3".to_owned(), "World3".to_owned());
        assert_eq!(lru.len(), 4);
        assert_eq!(lru.allocated_memory(), 12 * 4);

        // If we replace an entry, the used memory is corrected...
        lru.put("Hello1".to_owned(), "".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 3 + 6);

        // Restore the previous entry...
        lru.put("Hello1".to_owned(), "World1".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 4);

        // Reading "Hello0" saves it, so that "Hello2" is the least recently used entry...
        assert_eq!(lru.get("Hello0").unwrap(), "World0");
        lru.put("Hello4".to_owned(), "World4".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 4);
        assert_eq!(lru.len(), 4);
        assert_eq!(lru.get("Hello2"), None);
        assert_eq!(lru.get("Hello0").unwrap(), "World0");

        // If we now add an entry which is 13 bytes long, two entries have to be dropped...
        lru.put("Hello5".to_owned(), "World50".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 2 + 13);
        assert_eq!(lru.len(), 3);
        assert_eq!(lru.get("Hello3"), None);
        assert_eq!(lru.get("Hello1"), None);
        assert_eq!(lru.get("Hello0").unwrap(), "World0");
        assert_eq!(lru.get("Hello4").unwrap(), "World4");
    }

    #[test]
    fn budget_holds_after_every_put() {
        let mut lru = LruCache::new(100);

        for i in 0..500 {
            lru.put(format!("key{}", i), "v".repeat(i % 37));
            assert!(lru.allocated_memory() <= 100);
        }
    }

    #[test]
    fn unbounded_cache_never_evicts() {
        let mut lru = LruCache::new(0);
        for i in 0..1000 {
            lru.put(format!("key{}", i), "value".to_owned());
        }

        assert_eq!(lru.len(), 1000);
        assert_eq!(lru.evictions(), 0);
        assert_eq!(lru.memory_utilization(), 0.);
    }

    #[test]
    fn eviction_callback_sees_each_entry_once() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let log = evicted.clone();
        let mut lru = LruCache::with_eviction_callback(
            "key1".len() + "key2".len() + "k3".len() + "value1".len() + "value2".len() + 2,
            Box::new(move |key: &str, value: &String| {
                log.lock().unwrap().push((key.to_owned(), value.clone()))
            }),
        );

        lru.put("key1".to_owned(), "value1".to_owned());
        lru.put("key2".to_owned(), "value2".to_owned());
        lru.put("k3".to_owned(), "v3".to_owned());
        lru.put("k4".to_owned(), "v4".to_owned());

        assert_eq!(
            *evicted.lock().unwrap(),
            vec![("key1".to_owned(), "value1".to_owned())]
        );
        assert_eq!(lru.get("key1"), None);
        assert_eq!(lru.evictions(), 1);
    }

    #[test]
    fn oversized_entries_empty_the_cache() {
        let mut lru = LruCache::new(10);
        lru.put("a".to_owned(), "1".to_owned());
        lru.put("b".to_owned(), "2".to_owned());

        lru.put("huge".to_owned(), "X".repeat(64));

        assert_eq!(lru.len(), 0);
        assert_eq!(lru.allocated_memory(), 0);
        assert_eq!(lru.evictions(), 3);
    }

    #[test]
    fn metrics_are_computed_correctly() {
        let mut lru = LruCache::new(10);

        // Write 3 values into the cache...
        lru.put("A".to_owned(), "A".to_owned());
        lru.put("B".to_owned(), "B".to_owned());
        lru.put("C".to_owned(), "C".to_owned());

        // Perform 4 reads, of which 3 hit a cache entry...
        assert_eq!(lru.get("A").is_some(), true);
        assert_eq!(lru.get("B").is_some(), true);
        assert_eq!(lru.get("C").is_some(), true);
        assert_eq!(lru.get("D").is_none(), true);

        assert_eq!(lru.writes(), 3);
        assert_eq!(lru.reads(), 4);
        assert_eq!(lru.hit_rate().round() as i32, 75);

        // The cache contains 6 bytes of data and has a max memory of 10 -> 60% memory utilization..
        assert_eq!(lru.allocated_memory(), 6);
        assert_eq!(lru.memory_utilization().round() as i32, 60);
    }
}
