use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::thread::{self, ThreadId};

use serde::{Deserialize, Serialize};
use tracing::debug;

use stockres_core::{DemandLineId, Entity, LocationId, MovementLineId, ProductId, TransferId};
use stockres_reservation::{
    DemandLine, Location, LocationLine, LocationLineKey, MovementLine, Product, ReservationQuery,
    StockStore, Transfer, TransferStatus, UnitOfWork,
};

/// Plain, serializable content of a store.
///
/// Used to seed a store from fixtures and to dump it after a replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub products: Vec<Product>,
    pub locations: Vec<Location>,
    pub transfers: Vec<Transfer>,
    pub movement_lines: Vec<MovementLine>,
    pub demand_lines: Vec<DemandLine>,
    pub location_lines: Vec<LocationLine>,
}

#[derive(Debug, Clone, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    locations: HashMap<LocationId, Location>,
    transfers: HashMap<TransferId, Transfer>,
    movement_lines: HashMap<MovementLineId, MovementLine>,
    demand_lines: HashMap<DemandLineId, DemandLine>,
    location_lines: HashMap<LocationLineKey, LocationLine>,
}

/// Prior value of one record written inside a unit of work.
#[derive(Debug)]
enum Undo {
    Transfer { before: Option<Transfer>, after: Transfer },
    MovementLine { before: Option<MovementLine>, after: MovementLine },
    DemandLine { before: Option<DemandLine>, after: DemandLine },
    LocationLine { before: Option<LocationLine>, after: LocationLine },
}

impl Undo {
    fn revert(self, state: &mut State) {
        match self {
            Undo::Transfer { before, after } => revert(&mut state.transfers, before, after),
            Undo::MovementLine { before, after } => revert(&mut state.movement_lines, before, after),
            Undo::DemandLine { before, after } => revert(&mut state.demand_lines, before, after),
            Undo::LocationLine { before, after } => revert(&mut state.location_lines, before, after),
        }
    }
}

/// Put `before` back, unless a unit that has since committed overwrote `after`.
fn revert<E: Entity + PartialEq>(table: &mut HashMap<E::Id, E>, before: Option<E>, after: E) {
    if table.get(after.id()) != Some(&after) {
        return;
    }
    match before {
        Some(record) => {
            table.insert(record.id().clone(), record);
        }
        None => {
            table.remove(after.id());
        }
    }
}

/// Open units of work per thread, innermost last. Each keeps the undo
/// journal of its own writes.
type OpenUnits = HashMap<ThreadId, Vec<Vec<Undo>>>;

fn index<E: Entity>(table: &mut HashMap<E::Id, E>, records: Vec<E>) {
    table.extend(records.into_iter().map(|record| (record.id().clone(), record)));
}

fn sorted<E: Entity + Clone>(table: &HashMap<E::Id, E>) -> Vec<E>
where
    E::Id: Ord,
{
    let mut records: Vec<E> = table.values().cloned().collect();
    records.sort_by(|a, b| a.id().cmp(b.id()));
    records
}

/// In-memory record store, query contract and unit of work.
///
/// Intended for tests/dev and scenario replays. Queries scan every line.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    state: RwLock<State>,
    units: Mutex<OpenUnits>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        store.load(snapshot);
        store
    }

    /// Insert every record of `snapshot`, replacing records with the same id.
    pub fn load(&self, snapshot: StoreSnapshot) {
        let Ok(mut state) = self.state.write() else {
            return;
        };
        index(&mut state.products, snapshot.products);
        index(&mut state.locations, snapshot.locations);
        index(&mut state.transfers, snapshot.transfers);
        index(&mut state.movement_lines, snapshot.movement_lines);
        index(&mut state.demand_lines, snapshot.demand_lines);
        index(&mut state.location_lines, snapshot.location_lines);
    }

    /// Current content, each collection sorted by id.
    pub fn snapshot(&self) -> StoreSnapshot {
        let Ok(state) = self.state.read() else {
            return StoreSnapshot::default();
        };
        StoreSnapshot {
            products: sorted(&state.products),
            locations: sorted(&state.locations),
            transfers: sorted(&state.transfers),
            movement_lines: sorted(&state.movement_lines),
            demand_lines: sorted(&state.demand_lines),
            location_lines: sorted(&state.location_lines),
        }
    }

    pub fn insert_product(&self, product: Product) {
        if let Ok(mut state) = self.state.write() {
            state.products.insert(product.id, product);
        }
    }

    pub fn insert_location(&self, location: Location) {
        if let Ok(mut state) = self.state.write() {
            state.locations.insert(location.id, location);
        }
    }

    fn planned_lines<F>(&self, filter: F) -> Vec<MovementLine>
    where
        F: Fn(&MovementLine, &Transfer) -> bool,
    {
        let Ok(state) = self.state.read() else {
            return vec![];
        };
        let mut lines: Vec<MovementLine> = state
            .movement_lines
            .values()
            .filter(|line| {
                state
                    .transfers
                    .get(&line.transfer_id)
                    .is_some_and(|t| t.status == TransferStatus::Planned && filter(line, t))
            })
            .cloned()
            .collect();
        lines.sort_by_key(|line| line.id);
        lines
    }
}

impl StockStore for InMemoryStockStore {
    fn product(&self, id: &ProductId) -> Option<Product> {
        self.state.read().ok()?.products.get(id).cloned()
    }

    fn location(&self, id: &LocationId) -> Option<Location> {
        self.state.read().ok()?.locations.get(id).cloned()
    }

    fn transfer(&self, id: &TransferId) -> Option<Transfer> {
        self.state.read().ok()?.transfers.get(id).cloned()
    }

    fn movement_line(&self, id: &MovementLineId) -> Option<MovementLine> {
        self.state.read().ok()?.movement_lines.get(id).cloned()
    }

    fn demand_line(&self, id: &DemandLineId) -> Option<DemandLine> {
        self.state.read().ok()?.demand_lines.get(id).cloned()
    }

    fn location_line(&self, location: &LocationId, product: &ProductId) -> Option<LocationLine> {
        let key = LocationLineKey {
            location_id: *location,
            product_id: *product,
        };
        self.state.read().ok()?.location_lines.get(&key).cloned()
    }

    fn get_or_create_location_line(&self, location: &LocationId, product: &ProductId) -> LocationLine {
        let key = LocationLineKey {
            location_id: *location,
            product_id: *product,
        };
        let created = {
            let Ok(mut state) = self.state.write() else {
                return LocationLine::new(*location, *product, None);
            };
            if let Some(line) = state.location_lines.get(&key) {
                return line.clone();
            }
            let unit = state.products.get(product).and_then(|p| p.unit.clone());
            let line = LocationLine::new(*location, *product, unit);
            state.location_lines.insert(key, line.clone());
            line
        };
        self.journal(Undo::LocationLine {
            before: None,
            after: created.clone(),
        });
        created
    }

    fn upsert_transfer(&self, transfer: Transfer) {
        let before = {
            let Ok(mut state) = self.state.write() else {
                return;
            };
            state.transfers.insert(transfer.id, transfer.clone())
        };
        self.journal(Undo::Transfer {
            before,
            after: transfer,
        });
    }

    fn upsert_movement_line(&self, line: MovementLine) {
        let before = {
            let Ok(mut state) = self.state.write() else {
                return;
            };
            state.movement_lines.insert(line.id, line.clone())
        };
        self.journal(Undo::MovementLine { before, after: line });
    }

    fn upsert_demand_line(&self, line: DemandLine) {
        let before = {
            let Ok(mut state) = self.state.write() else {
                return;
            };
            state.demand_lines.insert(line.id, line.clone())
        };
        self.journal(Undo::DemandLine { before, after: line });
    }

    fn upsert_location_line(&self, line: LocationLine) {
        let before = {
            let Ok(mut state) = self.state.write() else {
                return;
            };
            state.location_lines.insert(line.key, line.clone())
        };
        self.journal(Undo::LocationLine { before, after: line });
    }
}

impl ReservationQuery for InMemoryStockStore {
    fn waiting_movement_lines(&self, location: &LocationId, product: &ProductId) -> Vec<MovementLine> {
        let Ok(state) = self.state.read() else {
            return vec![];
        };
        let mut lines: Vec<(MovementLine, Option<chrono::NaiveDate>)> = state
            .movement_lines
            .values()
            .filter(|line| line.product_id == *product && line.is_waiting())
            .filter_map(|line| {
                let transfer = state.transfers.get(&line.transfer_id)?;
                (transfer.status == TransferStatus::Planned && transfer.from_location == *location)
                    .then(|| (line.clone(), transfer.estimated_date))
            })
            .collect();
        // Missing estimated dates sort last.
        lines.sort_by_key(|(line, estimated)| {
            (line.reservation_at, estimated.is_none(), *estimated, line.id)
        });
        lines.into_iter().map(|(line, _)| line).collect()
    }

    fn planned_movement_lines_for_demand(&self, demand: &DemandLineId) -> Vec<MovementLine> {
        self.planned_lines(|line, _| line.demand_line_id == Some(*demand))
    }

    fn planned_movement_lines_for_location(
        &self,
        key: &LocationLineKey,
        exclude_availability_requested: bool,
    ) -> Vec<MovementLine> {
        self.planned_lines(|line, transfer| {
            line.product_id == key.product_id
                && transfer.from_location == key.location_id
                && !(exclude_availability_requested && transfer.availability_request)
        })
    }
}

/// Units of work are independent of each other, nested ones included: a
/// commit is final, and a rollback only reverts the writes of its own unit
/// that are still current.
impl UnitOfWork for InMemoryStockStore {
    fn begin(&self) {
        if let Ok(mut units) = self.units.lock() {
            units.entry(thread::current().id()).or_default().push(Vec::new());
        }
    }

    fn commit(&self) {
        self.close_unit();
    }

    fn rollback(&self) {
        let Some(journal) = self.close_unit() else {
            return;
        };
        let Ok(mut state) = self.state.write() else {
            return;
        };
        let reverted = journal.len();
        for undo in journal.into_iter().rev() {
            undo.revert(&mut state);
        }
        debug!(reverted, "in-memory unit of work rolled back");
    }
}

impl InMemoryStockStore {
    /// Record a write in the innermost unit of work of the calling thread.
    /// Writes outside any unit are not journaled.
    fn journal(&self, undo: Undo) {
        let Ok(mut units) = self.units.lock() else {
            return;
        };
        if let Some(journal) = units
            .get_mut(&thread::current().id())
            .and_then(|open| open.last_mut())
        {
            journal.push(undo);
        }
    }

    fn close_unit(&self) -> Option<Vec<Undo>> {
        let mut units = self.units.lock().ok()?;
        let id = thread::current().id();
        let open = units.get_mut(&id)?;
        let journal = open.pop();
        if open.is_empty() {
            units.remove(&id);
        }
        journal
    }
}
