//! # Facility Service
//!
//! Two orthogonal capabilities (§4.10). **List enumeration**: four typed
//! requests — airports, waypoints, NDBs, VORs — each answered as a stream
//! of multi-part frames accumulated until `entry_number + 1 == out_of`,
//! grounded on `facility_list_handler.hpp`'s four near-identical
//! `list{Airports,Waypoints,NDBs,VORs}` methods (collapsed here into one
//! generic [`ListChannel`] parameterized by the per-type entry struct, since
//! the accumulation/completion logic is identical across all four).
//! **Structured facility data**: a composable definition builder that
//! emits a sequence of field tokens describing which nested scopes of an
//! airport record to request, grounded on `airport.hpp`'s
//! `AirportBuilder`/`RunwayBuilder`/... chain — ported from constexpr
//! value-building to an owned `Vec<FacilityField>` threaded through each
//! nested builder by value, which is the natural Rust rendering of the same
//! "push a token, `.end()` pops the scope" shape. The response side
//! assembles the records streamed back over one or more `FACILITY_DATA`
//! frames into a single `Airport`-rooted tree (`AirportFacility` in
//! `airport.hpp`: an `AirportData` skeleton plus `Vec<RunwayData>` and a
//! `Map<ParkingKey, TaxiParkingFacility>`), delivering it whole on
//! `FACILITY_DATA_END` rather than handing the caller raw per-frame bytes.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::Reader;
use crate::config::Generation;
use crate::connection::Connection;
use crate::dispatch::{Dispatcher, Frame};
use crate::error::Result;
use crate::handler::{Registration, SinglePolicy, SingleThreadedRegistry};
use crate::ids::{DefinitionId, RequestId};
use crate::message::MessageTypeId;
use crate::request::Request;
use crate::transport::Transport;
use crate::types::{FacilityListScope, FacilityListType};

pub const FACILITY_AIRPORT_LIST: MessageTypeId = 14;
pub const FACILITY_WAYPOINT_LIST: MessageTypeId = 15;
pub const FACILITY_NDB_LIST: MessageTypeId = 16;
pub const FACILITY_VOR_LIST: MessageTypeId = 17;
pub const FACILITY_DATA: MessageTypeId = 18;
pub const FACILITY_DATA_END: MessageTypeId = 19;

// --- List enumeration ------------------------------------------------

/// One entry type answerable by [`ListChannel`]: knows how to decode
/// itself from a list-response frame's per-entry region.
pub trait FacilityEntry: Sized {
    fn decode(reader: &mut Reader<'_>) -> Result<Self>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AirportEntry {
    pub ident: String,
    pub region: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl FacilityEntry for AirportEntry {
    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            ident: r.read_stringn(9)?,
            region: r.read_stringn(9)?,
            latitude: r.read_f64()?,
            longitude: r.read_f64()?,
            altitude: r.read_f64()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaypointEntry {
    pub ident: String,
    pub region: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub magnetic_variation: f32,
}

impl FacilityEntry for WaypointEntry {
    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            ident: r.read_stringn(9)?,
            region: r.read_stringn(9)?,
            latitude: r.read_f64()?,
            longitude: r.read_f64()?,
            altitude: r.read_f64()?,
            magnetic_variation: r.read_f32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NdbEntry {
    pub ident: String,
    pub region: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub magnetic_variation: f32,
    pub frequency: f32,
}

impl NdbEntry {
    /// The broadcast frequency in kHz (the wire value is in Hz).
    pub fn frequency_khz(&self) -> f32 {
        self.frequency / 1_000.0
    }
}

impl FacilityEntry for NdbEntry {
    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            ident: r.read_stringn(9)?,
            region: r.read_stringn(9)?,
            latitude: r.read_f64()?,
            longitude: r.read_f64()?,
            altitude: r.read_f64()?,
            magnetic_variation: r.read_f32()?,
            frequency: r.read_f32()?,
        })
    }
}

/// Bit flags carried by [`VorEntry::flags`], mirroring the host's
/// `SIMCONNECT_RECV_ID_VOR_LIST_HAS_*` constants.
pub mod vor_flags {
    pub const HAS_NAV_SIGNAL: u32 = 1 << 0;
    pub const HAS_LOCALIZER: u32 = 1 << 1;
    pub const HAS_GLIDE_SLOPE: u32 = 1 << 2;
    pub const HAS_DME: u32 = 1 << 3;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VorEntry {
    pub ident: String,
    pub region: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub magnetic_variation: f32,
    pub frequency: f32,
    pub flags: u32,
    pub localizer_course: f32,
    pub glideslope_latitude: f64,
    pub glideslope_longitude: f64,
    pub glideslope_altitude: f64,
    pub glideslope_angle: f32,
}

impl VorEntry {
    /// The broadcast frequency in MHz (the wire value is in Hz).
    pub fn frequency_mhz(&self) -> f32 {
        self.frequency / 1_000_000.0
    }

    pub fn has_nav_signal(&self) -> bool {
        self.flags & vor_flags::HAS_NAV_SIGNAL != 0
    }

    pub fn has_localizer(&self) -> bool {
        self.flags & vor_flags::HAS_LOCALIZER != 0
    }

    pub fn has_glide_slope(&self) -> bool {
        self.flags & vor_flags::HAS_GLIDE_SLOPE != 0 && self.glideslope_angle > 0.0
    }

    pub fn has_dme(&self) -> bool {
        self.flags & vor_flags::HAS_DME != 0
    }
}

impl FacilityEntry for VorEntry {
    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            ident: r.read_stringn(9)?,
            region: r.read_stringn(9)?,
            latitude: r.read_f64()?,
            longitude: r.read_f64()?,
            altitude: r.read_f64()?,
            magnetic_variation: r.read_f32()?,
            frequency: r.read_f32()?,
            flags: r.read_i32()? as u32,
            localizer_course: r.read_f32()?,
            glideslope_latitude: r.read_f64()?,
            glideslope_longitude: r.read_f64()?,
            glideslope_altitude: r.read_f64()?,
            glideslope_angle: r.read_f32()?,
        })
    }
}

struct ListFrame<E> {
    request_id: RequestId,
    entry_number: u32,
    out_of: u32,
    entries: Vec<E>,
}

fn decode_list_frame<E: FacilityEntry>(payload: &[u8]) -> Result<ListFrame<E>> {
    let mut r = Reader::new(payload);
    let request_id = RequestId(r.read_i32()? as u32);
    let array_size = r.read_i32()? as u32;
    let entry_number = r.read_i32()? as u32;
    let out_of = r.read_i32()? as u32;
    let mut entries = Vec::with_capacity(array_size as usize);
    for _ in 0..array_size {
        entries.push(E::decode(&mut r)?);
    }
    Ok(ListFrame {
        request_id,
        entry_number,
        out_of,
        entries,
    })
}

fn peek_request_id(payload: &[u8]) -> Result<RequestId> {
    let mut r = Reader::new(payload);
    Ok(RequestId(r.read_i32()? as u32))
}

type ListRegistry = SingleThreadedRegistry<RequestId, Frame, SinglePolicy<Frame>>;

/// Accumulates a list-enumeration request of one entry type `E` until
/// completion, then removes its own handler slot (§4.10, mirroring
/// [`crate::services::simobject_data::SimObjectDataService`]'s by-type bulk
/// "completed" side-channel — the same no-op-on-self-unregister pitfall
/// applies here for the same reason).
pub struct ListChannel<E> {
    registry: Arc<ListRegistry>,
    completed: Arc<Mutex<Vec<RequestId>>>,
    _entry: std::marker::PhantomData<E>,
}

impl<E: FacilityEntry + Send + 'static> Default for ListChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: FacilityEntry + Send + 'static> ListChannel<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ListRegistry::new_single_threaded()),
            completed: Arc::new(Mutex::new(Vec::new())),
            _entry: std::marker::PhantomData,
        }
    }

    pub fn attach(&self, dispatcher: &Dispatcher, message_type: MessageTypeId) {
        let registry = self.registry.clone();
        let completed = self.completed.clone();
        dispatcher.on_message(message_type, move |frame: &Frame| {
            let Ok(request_id) = peek_request_id(&frame.payload) else {
                return;
            };
            registry.dispatch(request_id, frame);
            let mut done = completed.lock();
            if let Some(pos) = done.iter().position(|id| *id == request_id) {
                done.remove(pos);
                registry.unregister_all(&request_id);
            }
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn request<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        scope: FacilityListScope,
        list_type: FacilityListType,
        mut per_entry: impl FnMut(&E) + Send + 'static,
        mut on_done: Option<impl FnMut() + Send + 'static>,
    ) -> Result<Request> {
        let request_id = connection.ids().next_request_id()?;
        let completed = self.completed.clone();
        self.registry.register(
            request_id,
            Registration::new(
                Box::new(move |frame: &Frame| {
                    if let Ok(list_frame) = decode_list_frame::<E>(&frame.payload) {
                        for entry in &list_frame.entries {
                            per_entry(entry);
                        }
                        if list_frame.entry_number + 1 == list_frame.out_of {
                            if let Some(done) = on_done.as_mut() {
                                done();
                            }
                            completed.lock().push(request_id);
                        }
                    }
                }),
                false,
            ),
        );
        let result = connection.transport_mut().list_facilities(request_id, scope, list_type);
        connection.record_result(result)?;

        let registry = self.registry.clone();
        Ok(Request::new(request_id, move || {
            registry.unregister_all(&request_id);
        }))
    }
}

// --- Structured facility-data response assembly ------------------------

/// The type tag carried by each `FACILITY_DATA` frame, identifying which
/// per-scope record the frame's remaining payload holds. The host SDK's own
/// `FacilityDataTypes` wire values are vendor-specific and not part of this
/// crate's scope (cf. [`crate::message::MessageTypeId`]); these are this
/// crate's own constants for the record kinds it actually assembles.
pub type FacilityDataKind = u32;

/// See [`FacilityDataKind`].
pub mod facility_data_kind {
    use super::FacilityDataKind;
    pub const AIRPORT: FacilityDataKind = 0;
    pub const RUNWAY: FacilityDataKind = 1;
    pub const TAXI_PARKING: FacilityDataKind = 2;
}

/// One runway record nested under an [`Airport`] (`RunwayData` in
/// `runway.hpp`, primary-end fields only — approach lights, VASI and
/// pavement sub-records are not surfaced here).
#[derive(Debug, Clone, PartialEq)]
pub struct Runway {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub heading: f32,
    pub length: f32,
    pub width: f32,
    pub surface: i32,
}

impl Runway {
    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            latitude: r.read_f64()?,
            longitude: r.read_f64()?,
            altitude: r.read_f64()?,
            heading: r.read_f32()?,
            length: r.read_f32()?,
            width: r.read_f32()?,
            surface: r.read_i32()?,
        })
    }
}

/// The `(name, number, suffix)` triple `taxi_parking.hpp`'s `ParkingKey`
/// dedups and orders taxi parkings by. `ParkingName` is itself a vendor
/// enum; its raw wire code is carried here rather than re-declared, the
/// same way [`Runway::surface`] carries `RunwaySurface`'s raw code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ParkingKey {
    pub name: i32,
    pub number: i32,
    pub suffix: i32,
}

/// One taxi parking spot nested under an [`Airport`], keyed by
/// [`ParkingKey`] (`TaxiParkingFacility` in `taxi_parking.hpp`).
#[derive(Debug, Clone, PartialEq)]
pub struct TaxiParking {
    pub key: ParkingKey,
    pub heading: f32,
    pub radius: f32,
    pub airlines: std::collections::BTreeSet<String>,
}

impl TaxiParking {
    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let key = ParkingKey {
            name: r.read_i32()?,
            number: r.read_i32()?,
            suffix: r.read_i32()?,
        };
        let heading = r.read_f32()?;
        let radius = r.read_f32()?;
        Ok(Self {
            key,
            heading,
            radius,
            airlines: std::collections::BTreeSet::new(),
        })
    }
}

/// The assembled structured facility-data response (§4.10 para 2):
/// `AirportFacility` in `airport.hpp` — an `AirportData` skeleton with its
/// `runways` vector and `taxiParkings` map folded in as the frames stream
/// by, delivered whole to the caller once `FACILITY_DATA_END` arrives.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Airport {
    pub icao: String,
    pub region: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub runways: Vec<Runway>,
    pub taxi_parkings: BTreeMap<ParkingKey, TaxiParking>,
}

impl Airport {
    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            icao: r.read_stringn(9)?,
            region: r.read_stringn(9)?,
            latitude: r.read_f64()?,
            longitude: r.read_f64()?,
            altitude: r.read_f64()?,
            runways: Vec::new(),
            taxi_parkings: BTreeMap::new(),
        })
    }

    /// Folds one decoded record into the tree by kind. Airport records
    /// replace the skeleton fields; runway and taxi-parking records append
    /// to their respective collections, the latter deduplicating by
    /// [`ParkingKey`] the same way `std::map<ParkingKey, TaxiParkingFacility>`
    /// does in the original.
    fn fold(&mut self, kind: FacilityDataKind, r: &mut Reader<'_>) -> Result<()> {
        if kind == facility_data_kind::AIRPORT {
            let decoded = Airport::decode(r)?;
            self.icao = decoded.icao;
            self.region = decoded.region;
            self.latitude = decoded.latitude;
            self.longitude = decoded.longitude;
            self.altitude = decoded.altitude;
        } else if kind == facility_data_kind::RUNWAY {
            self.runways.push(Runway::decode(r)?);
        } else if kind == facility_data_kind::TAXI_PARKING {
            let parking = TaxiParking::decode(r)?;
            self.taxi_parkings.insert(parking.key, parking);
        }
        Ok(())
    }
}

/// Reads a `FACILITY_DATA` frame's request id and record-kind tag, leaving
/// the reader positioned at the start of the record payload.
fn decode_facility_data_header(payload: &[u8]) -> Result<(RequestId, FacilityDataKind, Reader<'_>)> {
    let mut r = Reader::new(payload);
    let request_id = RequestId(r.read_i32()? as u32);
    let kind = r.read_i32()? as u32;
    Ok((request_id, kind, r))
}

/// Owns the four list-enumeration channels plus structured facility-data
/// correlation. One instance is attached per connection.
pub struct FacilityService {
    airports: ListChannel<AirportEntry>,
    waypoints: ListChannel<WaypointEntry>,
    ndbs: ListChannel<NdbEntry>,
    vors: ListChannel<VorEntry>,
    data: Arc<SingleThreadedRegistry<RequestId, Frame, SinglePolicy<Frame>>>,
}

impl Default for FacilityService {
    fn default() -> Self {
        Self::new()
    }
}

impl FacilityService {
    pub fn new() -> Self {
        Self {
            airports: ListChannel::new(),
            waypoints: ListChannel::new(),
            ndbs: ListChannel::new(),
            vors: ListChannel::new(),
            data: Arc::new(SingleThreadedRegistry::new_single_threaded()),
        }
    }

    pub fn attach(&self, dispatcher: &Dispatcher) {
        self.airports.attach(dispatcher, FACILITY_AIRPORT_LIST);
        self.waypoints.attach(dispatcher, FACILITY_WAYPOINT_LIST);
        self.ndbs.attach(dispatcher, FACILITY_NDB_LIST);
        self.vors.attach(dispatcher, FACILITY_VOR_LIST);

        let data = self.data.clone();
        dispatcher.on_message(FACILITY_DATA, move |frame: &Frame| {
            if let Ok(request_id) = peek_request_id(&frame.payload) {
                data.dispatch(request_id, frame);
            }
        });
        let data_end = self.data.clone();
        dispatcher.on_message(FACILITY_DATA_END, move |frame: &Frame| {
            if let Ok(request_id) = peek_request_id(&frame.payload) {
                data_end.dispatch(request_id, frame);
                data_end.unregister_all(&request_id);
            }
        });
    }

    pub fn list_airports<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        scope: FacilityListScope,
        per_entry: impl FnMut(&AirportEntry) + Send + 'static,
        on_done: Option<impl FnMut() + Send + 'static>,
    ) -> Result<Request> {
        self.airports
            .request(connection, scope, FacilityListType::Airport, per_entry, on_done)
    }

    pub fn list_waypoints<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        scope: FacilityListScope,
        per_entry: impl FnMut(&WaypointEntry) + Send + 'static,
        on_done: Option<impl FnMut() + Send + 'static>,
    ) -> Result<Request> {
        self.waypoints
            .request(connection, scope, FacilityListType::Waypoint, per_entry, on_done)
    }

    pub fn list_ndbs<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        scope: FacilityListScope,
        per_entry: impl FnMut(&NdbEntry) + Send + 'static,
        on_done: Option<impl FnMut() + Send + 'static>,
    ) -> Result<Request> {
        self.ndbs.request(connection, scope, FacilityListType::Ndb, per_entry, on_done)
    }

    pub fn list_vors<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        scope: FacilityListScope,
        per_entry: impl FnMut(&VorEntry) + Send + 'static,
        on_done: Option<impl FnMut() + Send + 'static>,
    ) -> Result<Request> {
        self.vors.request(connection, scope, FacilityListType::Vor, per_entry, on_done)
    }

    /// Issues a structured facility-data request for `icao`/`region`
    /// against a definition built with [`FacilityDefinitionBuilder`]. Each
    /// `FACILITY_DATA` frame is decoded by its record-kind tag and folded
    /// into an [`Airport`]-rooted tree (runways appended, taxi parkings
    /// deduplicated by [`ParkingKey`]); `on_airport` fires once with the
    /// assembled tree when the host sends the terminating "data-end" frame.
    pub fn request_facility_data<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        def_id: DefinitionId,
        icao: &str,
        region: &str,
        mut on_airport: impl FnMut(Airport) + Send + 'static,
    ) -> Result<Request> {
        let request_id = connection.ids().next_request_id()?;
        let mut airport = Airport::default();
        self.data.register(
            request_id,
            Registration::new(
                Box::new(move |frame: &Frame| {
                    if frame.header.id == FACILITY_DATA_END {
                        on_airport(std::mem::take(&mut airport));
                    } else if let Ok((_, kind, mut r)) = decode_facility_data_header(&frame.payload) {
                        let _ = airport.fold(kind, &mut r);
                    }
                }),
                false,
            ),
        );
        let result = connection.transport_mut().request_facility_data(def_id, request_id, icao, region);
        connection.record_result(result)?;

        let registry = self.data.clone();
        Ok(Request::new(request_id, move || {
            registry.unregister_all(&request_id);
        }))
    }
}

// --- Structured facility-data definition builder ----------------------

/// One token in a facility-data definition's field sequence (§4.10). Open
/// tokens enter a nested scope; the matching `*Close` leaves it; the
/// remainder are leaf fields with no further nesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacilityField {
    AirportOpen,
    AirportClose,
    RunwayOpen,
    RunwayClose,
    RunwayPavement,
    RunwayApproachLights,
    RunwayVasi,
    StartOpen,
    StartClose,
    FrequencyOpen,
    FrequencyClose,
    HelipadOpen,
    HelipadClose,
    ApproachOpen,
    ApproachClose,
    ApproachTransitionOpen,
    ApproachTransitionClose,
    ApproachLeg,
    TaxiParkingOpen,
    TaxiParkingClose,
    TaxiParkingAirline,
    TaxiPathOpen,
    TaxiPathClose,
    TaxiPointOpen,
    TaxiPointClose,
    TaxiNameOpen,
    TaxiNameClose,
    JetwayOpen,
    JetwayClose,
    VdgsOpen,
    VdgsClose,
    HoldingPatternOpen,
    HoldingPatternClose,
}

/// Entry point for building a facility-data definition. `generation` gates
/// the 2024-only scopes (`vdgs`, `holding_pattern`) — on `Generation::Legacy`
/// those calls are no-ops (§4.10: "otherwise they are omitted").
pub struct FacilityDefinitionBuilder {
    generation: Generation,
}

impl FacilityDefinitionBuilder {
    pub fn new(generation: Generation) -> Self {
        Self { generation }
    }

    /// Opens the top-level `airport` scope.
    pub fn airport(self) -> AirportBuilder {
        AirportBuilder {
            fields: vec![FacilityField::AirportOpen],
            generation: self.generation,
        }
    }
}

/// Builds the `airport { ... }` scope's child tokens. Every child-opening
/// method returns a dedicated builder for that scope; `.end()` closes it
/// and hands the accumulated field list back.
pub struct AirportBuilder {
    fields: Vec<FacilityField>,
    generation: Generation,
}

impl AirportBuilder {
    pub fn runway(mut self) -> RunwayBuilder {
        self.fields.push(FacilityField::RunwayOpen);
        RunwayBuilder { parent: self }
    }

    pub fn start(mut self) -> Self {
        self.fields.push(FacilityField::StartOpen);
        self.fields.push(FacilityField::StartClose);
        self
    }

    pub fn frequency(mut self) -> Self {
        self.fields.push(FacilityField::FrequencyOpen);
        self.fields.push(FacilityField::FrequencyClose);
        self
    }

    pub fn helipad(mut self) -> Self {
        self.fields.push(FacilityField::HelipadOpen);
        self.fields.push(FacilityField::HelipadClose);
        self
    }

    pub fn approach(mut self) -> ApproachBuilder {
        self.fields.push(FacilityField::ApproachOpen);
        ApproachBuilder { parent: self }
    }

    pub fn taxi_parking(mut self) -> TaxiParkingBuilder {
        self.fields.push(FacilityField::TaxiParkingOpen);
        TaxiParkingBuilder { parent: self }
    }

    pub fn taxi_path(mut self) -> Self {
        self.fields.push(FacilityField::TaxiPathOpen);
        self.fields.push(FacilityField::TaxiPathClose);
        self
    }

    pub fn taxi_point(mut self) -> Self {
        self.fields.push(FacilityField::TaxiPointOpen);
        self.fields.push(FacilityField::TaxiPointClose);
        self
    }

    pub fn taxi_name(mut self) -> Self {
        self.fields.push(FacilityField::TaxiNameOpen);
        self.fields.push(FacilityField::TaxiNameClose);
        self
    }

    pub fn jetway(mut self) -> Self {
        self.fields.push(FacilityField::JetwayOpen);
        self.fields.push(FacilityField::JetwayClose);
        self
    }

    /// 2024-only scope; a no-op under `Generation::Legacy`.
    pub fn vdgs(mut self) -> Self {
        if self.generation == Generation::Current {
            self.fields.push(FacilityField::VdgsOpen);
            self.fields.push(FacilityField::VdgsClose);
        }
        self
    }

    /// 2024-only scope; a no-op under `Generation::Legacy`.
    pub fn holding_pattern(mut self) -> Self {
        if self.generation == Generation::Current {
            self.fields.push(FacilityField::HoldingPatternOpen);
            self.fields.push(FacilityField::HoldingPatternClose);
        }
        self
    }

    /// Closes the `airport` scope and returns the finished token sequence.
    pub fn end(mut self) -> Vec<FacilityField> {
        self.fields.push(FacilityField::AirportClose);
        self.fields
    }
}

pub struct RunwayBuilder {
    parent: AirportBuilder,
}

impl RunwayBuilder {
    pub fn pavement(mut self) -> Self {
        self.parent.fields.push(FacilityField::RunwayPavement);
        self
    }

    pub fn approach_lights(mut self) -> Self {
        self.parent.fields.push(FacilityField::RunwayApproachLights);
        self
    }

    pub fn vasi(mut self) -> Self {
        self.parent.fields.push(FacilityField::RunwayVasi);
        self
    }

    pub fn end(mut self) -> AirportBuilder {
        self.parent.fields.push(FacilityField::RunwayClose);
        self.parent
    }
}

pub struct ApproachBuilder {
    parent: AirportBuilder,
}

impl ApproachBuilder {
    pub fn approach_transition(mut self) -> ApproachTransitionBuilder {
        self.parent.fields.push(FacilityField::ApproachTransitionOpen);
        ApproachTransitionBuilder { parent: self }
    }

    pub fn end(mut self) -> AirportBuilder {
        self.parent.fields.push(FacilityField::ApproachClose);
        self.parent
    }
}

pub struct ApproachTransitionBuilder {
    parent: ApproachBuilder,
}

impl ApproachTransitionBuilder {
    pub fn approach_leg(mut self) -> Self {
        self.parent.parent.fields.push(FacilityField::ApproachLeg);
        self
    }

    pub fn end(mut self) -> ApproachBuilder {
        self.parent.parent.fields.push(FacilityField::ApproachTransitionClose);
        self.parent
    }
}

pub struct TaxiParkingBuilder {
    parent: AirportBuilder,
}

impl TaxiParkingBuilder {
    pub fn airline(mut self) -> Self {
        self.parent.fields.push(FacilityField::TaxiParkingAirline);
        self
    }

    pub fn end(mut self) -> AirportBuilder {
        self.parent.fields.push(FacilityField::TaxiParkingClose);
        self.parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Builder;
    use crate::transport::{MockTransport, OpenMode};
    use std::sync::Mutex as StdMutex;

    fn raw_frame(msg: MessageTypeId, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        let size = (crate::message::HEADER_SIZE + payload.len()) as u32;
        buf.extend_from_slice(&size.to_ne_bytes());
        buf.extend_from_slice(&1u32.to_ne_bytes());
        buf.extend_from_slice(&msg.to_ne_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    fn airport_data_frame(request_id: u32, icao: &str, region: &str) -> Vec<u8> {
        let mut b = Builder::new();
        b.put_i32(request_id as i32);
        b.put_i32(facility_data_kind::AIRPORT as i32);
        b.put_stringn(icao, 9);
        b.put_stringn(region, 9);
        b.put_f64(47.4);
        b.put_f64(-122.3);
        b.put_f64(433.0);
        b.into_bytes()
    }

    fn runway_data_frame(request_id: u32, length: f32) -> Vec<u8> {
        let mut b = Builder::new();
        b.put_i32(request_id as i32);
        b.put_i32(facility_data_kind::RUNWAY as i32);
        b.put_f64(47.4);
        b.put_f64(-122.3);
        b.put_f64(433.0);
        b.put_f32(160.0);
        b.put_f32(length);
        b.put_f32(45.0);
        b.put_i32(1);
        b.into_bytes()
    }

    fn taxi_parking_data_frame(request_id: u32, name: i32, number: i32, suffix: i32) -> Vec<u8> {
        let mut b = Builder::new();
        b.put_i32(request_id as i32);
        b.put_i32(facility_data_kind::TAXI_PARKING as i32);
        b.put_i32(name);
        b.put_i32(number);
        b.put_i32(suffix);
        b.put_f32(90.0);
        b.put_f32(12.0);
        b.into_bytes()
    }

    fn data_end_frame(request_id: u32) -> Vec<u8> {
        let mut b = Builder::new();
        b.put_i32(request_id as i32);
        b.into_bytes()
    }

    fn airport_list_frame(request_id: u32, entries: &[(&str, &str, f64, f64, f64)], entry_number: u32, out_of: u32) -> Vec<u8> {
        let mut b = Builder::new();
        b.put_i32(request_id as i32);
        b.put_i32(entries.len() as i32);
        b.put_i32(entry_number as i32);
        b.put_i32(out_of as i32);
        for (ident, region, lat, lon, alt) in entries {
            b.put_stringn(ident, 9);
            b.put_stringn(region, 9);
            b.put_f64(*lat);
            b.put_f64(*lon);
            b.put_f64(*alt);
        }
        b.into_bytes()
    }

    #[test]
    fn airport_list_accumulates_across_frames_then_completes_and_removes_handler() {
        let mut conn = Connection::new(MockTransport::new());
        conn.open("test", OpenMode::Simple, 0).unwrap();
        let dispatcher = Dispatcher::new();
        let service = FacilityService::new();
        service.attach(&dispatcher);

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let s = seen.clone();
        let done = Arc::new(StdMutex::new(0u32));
        let d = done.clone();

        let request = service
            .list_airports(
                &mut conn,
                FacilityListScope::All,
                move |entry: &AirportEntry| s.lock().unwrap().push(entry.ident.clone()),
                Some(move || *d.lock().unwrap() += 1),
            )
            .unwrap();

        let rid = request.request_id().0;
        let frame1 = airport_list_frame(rid, &[("KSEA", "K1", 47.4, -122.3, 433.0)], 0, 2);
        let frame2 = airport_list_frame(rid, &[("KJFK", "K2", 40.6, -73.7, 13.0)], 1, 2);
        conn.transport_mut().push_frame(raw_frame(FACILITY_AIRPORT_LIST, &frame1));
        conn.transport_mut().push_frame(raw_frame(FACILITY_AIRPORT_LIST, &frame2));
        dispatcher.drain_once(&mut conn).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["KSEA".to_string(), "KJFK".to_string()]);
        assert_eq!(*done.lock().unwrap(), 1);

        // A further frame for the same request id produces no callbacks.
        let frame3 = airport_list_frame(rid, &[("EHAM", "EH", 52.3, 4.8, -11.0)], 0, 1);
        conn.transport_mut().push_frame(raw_frame(FACILITY_AIRPORT_LIST, &frame3));
        dispatcher.drain_once(&mut conn).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn vor_has_glide_slope_requires_both_flag_and_positive_angle() {
        let vor = VorEntry {
            ident: "SEA".into(),
            region: "K1".into(),
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            magnetic_variation: 0.0,
            frequency: 113_400_000.0,
            flags: vor_flags::HAS_GLIDE_SLOPE,
            localizer_course: 0.0,
            glideslope_latitude: 0.0,
            glideslope_longitude: 0.0,
            glideslope_altitude: 0.0,
            glideslope_angle: 0.0,
        };
        assert!(!vor.has_glide_slope());
        let vor = VorEntry {
            glideslope_angle: 3.0,
            ..vor
        };
        assert!(vor.has_glide_slope());
        assert_eq!(vor.frequency_mhz(), 113.4);
    }

    #[test]
    fn airport_builder_produces_expected_token_sequence() {
        let fields = FacilityDefinitionBuilder::new(Generation::Legacy)
            .airport()
            .runway()
            .pavement()
            .approach_lights()
            .vasi()
            .end()
            .taxi_parking()
            .airline()
            .end()
            .vdgs()
            .end();

        assert_eq!(
            fields,
            vec![
                FacilityField::AirportOpen,
                FacilityField::RunwayOpen,
                FacilityField::RunwayPavement,
                FacilityField::RunwayApproachLights,
                FacilityField::RunwayVasi,
                FacilityField::RunwayClose,
                FacilityField::TaxiParkingOpen,
                FacilityField::TaxiParkingAirline,
                FacilityField::TaxiParkingClose,
                FacilityField::AirportClose,
            ]
        );
    }

    #[test]
    fn request_facility_data_assembles_airport_tree_and_dedups_parkings() {
        let mut conn = Connection::new(MockTransport::new());
        conn.open("test", OpenMode::Simple, 0).unwrap();
        let dispatcher = Dispatcher::new();
        let service = FacilityService::new();
        service.attach(&dispatcher);

        let received = Arc::new(StdMutex::new(None));
        let r = received.clone();

        let request = service
            .request_facility_data(&mut conn, crate::ids::DefinitionId(1), "KSEA", "K1", move |airport| {
                *r.lock().unwrap() = Some(airport);
            })
            .unwrap();
        let rid = request.request_id().0;

        conn.transport_mut()
            .push_frame(raw_frame(FACILITY_DATA, &airport_data_frame(rid, "KSEA", "K1")));
        conn.transport_mut().push_frame(raw_frame(FACILITY_DATA, &runway_data_frame(rid, 3000.0)));
        conn.transport_mut().push_frame(raw_frame(FACILITY_DATA, &runway_data_frame(rid, 5000.0)));
        // Two frames for the same parking spot (e.g. a refreshed airline list) must dedup.
        conn.transport_mut()
            .push_frame(raw_frame(FACILITY_DATA, &taxi_parking_data_frame(rid, 1, 12, 0)));
        conn.transport_mut()
            .push_frame(raw_frame(FACILITY_DATA, &taxi_parking_data_frame(rid, 1, 12, 0)));
        conn.transport_mut()
            .push_frame(raw_frame(FACILITY_DATA, &taxi_parking_data_frame(rid, 1, 13, 0)));
        conn.transport_mut()
            .push_frame(raw_frame(FACILITY_DATA_END, &data_end_frame(rid)));
        dispatcher.drain_once(&mut conn).unwrap();

        let airport = received.lock().unwrap().take().expect("airport delivered on data-end");
        assert_eq!(airport.icao, "KSEA");
        assert_eq!(airport.region, "K1");
        assert_eq!(airport.runways.len(), 2);
        assert_eq!(airport.runways[0].length, 3000.0);
        assert_eq!(airport.runways[1].length, 5000.0);
        assert_eq!(airport.taxi_parkings.len(), 2);
        assert!(airport.taxi_parkings.contains_key(&ParkingKey {
            name: 1,
            number: 12,
            suffix: 0
        }));
        assert!(airport.taxi_parkings.contains_key(&ParkingKey {
            name: 1,
            number: 13,
            suffix: 0
        }));
    }

    #[test]
    fn current_generation_emits_2024_scopes() {
        let fields = FacilityDefinitionBuilder::new(Generation::Current).airport().vdgs().end();
        assert_eq!(
            fields,
            vec![
                FacilityField::AirportOpen,
                FacilityField::VdgsOpen,
                FacilityField::VdgsClose,
                FacilityField::AirportClose,
            ]
        );
    }
}
