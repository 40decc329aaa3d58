use mqttsn_core::Address;

/// A gateway the client has learned about via ADVERTISE/GWINFO.
/// `gw_id == 0` marks an empty slot (`operator bool()` in the reference
/// becomes this explicit predicate per the redesign notes).
#[derive(Debug, Clone, Default)]
pub struct GatewayRecord {
    pub gw_id: u8,
    pub gw_addr: Address,
    pub available: bool,
}

impl GatewayRecord {
    pub fn is_live(&self) -> bool {
        self.gw_id != 0
    }
}

/// Fixed-capacity table of known gateways, caller-sized via `N`.
pub struct GatewayTable<const N: usize> {
    slots: [GatewayRecord; N],
}

impl<const N: usize> Default for GatewayTable<N> {
    fn default() -> Self {
        GatewayTable { slots: core::array::from_fn(|_| GatewayRecord::default()) }
    }
}

impl<const N: usize> GatewayTable<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks every slot available. Called once by `add_gateways` and
    /// again whenever `select` exhausts every gateway.
    fn mark_all_available(&mut self) {
        for slot in self.slots.iter_mut() {
            if slot.is_live() {
                slot.available = true;
            }
        }
    }

    pub fn reset_available(&mut self) {
        self.mark_all_available();
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|g| g.is_live()).count()
    }

    pub fn get(&self, idx: usize) -> Option<&GatewayRecord> {
        self.slots.get(idx).filter(|g| g.is_live())
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut GatewayRecord> {
        if self.slots.get(idx).map(|g| g.is_live()).unwrap_or(false) {
            self.slots.get_mut(idx)
        } else {
            None
        }
    }

    pub fn find_by_id(&self, gw_id: u8) -> Option<usize> {
        self.slots.iter().position(|g| g.gw_id == gw_id && g.is_live())
    }

    /// Inserts a newly-heard-of gateway into the first empty slot. A no-op
    /// if `gw_id` is already known.
    pub fn insert(&mut self, gw_id: u8, gw_addr: Address) -> bool {
        if self.find_by_id(gw_id).is_some() {
            return false;
        }
        for slot in self.slots.iter_mut() {
            if !slot.is_live() {
                slot.gw_id = gw_id;
                slot.gw_addr = gw_addr;
                slot.available = true;
                return true;
            }
        }
        false
    }

    /// Gateway selection per spec.md §4.4: a requested id wins outright
    /// (or nothing does); otherwise the first available slot, promoting
    /// every slot back to available if none currently is.
    pub fn select(&mut self, gw_id: u8) -> Option<usize> {
        if gw_id != 0 {
            return self.find_by_id(gw_id);
        }
        if let Some(idx) = self.slots.iter().position(|g| g.is_live() && g.available) {
            return Some(idx);
        }
        self.mark_all_available();
        self.slots.iter().position(|g| g.is_live())
    }
}
