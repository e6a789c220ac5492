//! # Data Definition
//!
//! Declarative mapping between an application record type `R` and the
//! Protocol's field list (§4.5). A [`DataDefinition<R>`] accumulates
//! [`Field`] entries, each binding a Protocol variable name/units/type to
//! either a direct byte offset into `R` or a getter/setter closure pair.
//! Once every field has been added, [`DataDefinition::use_mapping`] tells
//! the caller whether the whole record can be transferred by a single raw
//! memory copy ("mapping") or must go through the field-at-a-time codec.
//!
//! [`field_offset!`] computes a byte offset into a `#[repr(C)]` record
//! without reading an initialized value, the same kind of raw-pointer
//! arithmetic the transport layer already relies on for its packed shared
//! buffers; it is the one place in this module unsafe code is needed.

use std::collections::HashMap;

use crate::codec::{Builder, DataType, Reader};
use crate::connection::Connection;
use crate::error::{Result, SimConnectError};
use crate::ids::DefinitionId;
use crate::transport::Transport;

/// Computes the byte offset of `$field` within `$ty`, which must be
/// `#[repr(C)]` (or `#[repr(C, packed)]`) for the offset to mean anything
/// on the wire. Does not construct or read a value of `$ty`.
#[macro_export]
macro_rules! field_offset {
    ($ty:ty, $field:ident) => {{
        let uninit = ::std::mem::MaybeUninit::<$ty>::uninit();
        let base = uninit.as_ptr();
        #[allow(unused_unsafe)]
        let field_ptr = unsafe { ::std::ptr::addr_of!((*base).$field) };
        (field_ptr as usize) - (base as usize)
    }};
}

/// How a [`Field`] reaches into `R`.
pub enum Accessor<R> {
    /// The field's wire image sits at this byte offset within `R`'s own
    /// memory representation. Eligible for the `use_mapping` fast path.
    Offset(usize),
    /// A getter/setter pair for fields that cannot be expressed as a
    /// direct memory offset. Disqualifies the record from `use_mapping`.
    Closures {
        get: Box<dyn Fn(&R, &mut Builder) + Send>,
        set: Box<dyn Fn(&mut R, &mut Reader) -> Result<()> + Send>,
    },
}

/// One bound field of a [`DataDefinition<R>`].
pub struct Field<R> {
    /// The Protocol variable name, e.g. `"PLANE ALTITUDE"`.
    pub name: String,
    /// The Protocol units, e.g. `"feet"`; empty for untyped strings.
    pub units: String,
    pub data_type: DataType,
    pub epsilon: f32,
    /// Per-field tag used in tagged responses; `DatumId::UNUSED` otherwise.
    pub datum_id: u32,
    accessor: Accessor<R>,
}

/// The host's "no datum id assigned" sentinel.
pub struct DatumId;
impl DatumId {
    pub const UNUSED: u32 = u32::MAX;
}

/// Declarative mapping between record type `R` and the Protocol's field
/// list. Once registered with a [`crate::connection::Connection`] the
/// field list is frozen; this type itself does not enforce that (the
/// connection does, by taking ownership on registration).
pub struct DataDefinition<R> {
    fields: Vec<Field<R>>,
    datum_index: HashMap<u32, usize>,
    accumulated_offset: usize,
    any_closures: bool,
    any_string_v: bool,
    /// When true, fields added without an explicit datum id are assigned
    /// sequential ids starting at 0; when false, they receive
    /// `DatumId::UNUSED` (§9, Open Question 1).
    use_tagged: bool,
    next_datum_id: u32,
}

impl<R> Default for DataDefinition<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> DataDefinition<R> {
    /// Creates an empty, untagged data definition.
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            datum_index: HashMap::new(),
            accumulated_offset: 0,
            any_closures: false,
            any_string_v: false,
            use_tagged: false,
            next_datum_id: 0,
        }
    }

    /// Creates an empty data definition that assigns sequential datum ids,
    /// for use with the tagged reception form.
    pub fn new_tagged() -> Self {
        let mut def = Self::new();
        def.use_tagged = true;
        def
    }

    fn next_datum(&mut self) -> u32 {
        if self.use_tagged {
            let id = self.next_datum_id;
            self.next_datum_id += 1;
            id
        } else {
            DatumId::UNUSED
        }
    }

    fn push(&mut self, name: &str, units: &str, data_type: DataType, epsilon: f32, accessor: Accessor<R>) -> &mut Self {
        let datum_id = self.next_datum();
        match &accessor {
            Accessor::Offset(offset) => {
                if *offset == self.accumulated_offset {
                    if let Some(size) = data_type.fixed_size() {
                        self.accumulated_offset += size;
                    }
                }
            }
            Accessor::Closures { .. } => self.any_closures = true,
        }
        if matches!(data_type, DataType::StringV) {
            self.any_string_v = true;
        }
        let index = self.fields.len();
        self.datum_index.insert(datum_id, index);
        self.fields.push(Field {
            name: name.to_string(),
            units: units.to_string(),
            data_type,
            epsilon,
            datum_id,
            accessor,
        });
        self
    }

    /// Binds an `i32` field at a direct byte offset into `R`.
    pub fn add_int32(&mut self, name: &str, units: &str, offset: usize) -> &mut Self {
        self.push(name, units, DataType::Int32, 0.0, Accessor::Offset(offset))
    }

    /// Binds an `i64` field at a direct byte offset into `R`.
    pub fn add_int64(&mut self, name: &str, units: &str, offset: usize) -> &mut Self {
        self.push(name, units, DataType::Int64, 0.0, Accessor::Offset(offset))
    }

    /// Binds an `f32` field at a direct byte offset into `R`, with an
    /// optional precision epsilon.
    pub fn add_float32(&mut self, name: &str, units: &str, offset: usize, epsilon: f32) -> &mut Self {
        self.push(name, units, DataType::Float32, epsilon, Accessor::Offset(offset))
    }

    /// Binds an `f64` field at a direct byte offset into `R`.
    pub fn add_float64(&mut self, name: &str, units: &str, offset: usize, epsilon: f32) -> &mut Self {
        self.push(name, units, DataType::Float64, epsilon, Accessor::Offset(offset))
    }

    /// Binds a getter/setter pair instead of a direct offset. Always
    /// disqualifies the definition from `use_mapping`.
    pub fn add_with_closures(
        &mut self,
        name: &str,
        units: &str,
        data_type: DataType,
        get: impl Fn(&R, &mut Builder) + Send + 'static,
        set: impl Fn(&mut R, &mut Reader) -> Result<()> + Send + 'static,
    ) -> &mut Self {
        self.push(
            name,
            units,
            data_type,
            0.0,
            Accessor::Closures {
                get: Box::new(get),
                set: Box::new(set),
            },
        )
    }

    /// Binds a fixed-width string field of `n` bytes (`n` in
    /// {8, 32, 64, 128, 256, 260}) at a direct byte offset into `R`.
    pub fn add_stringn(&mut self, name: &str, n: u16, offset: usize) -> &mut Self {
        self.push(name, "", DataType::StringN(n), 0.0, Accessor::Offset(offset))
    }

    /// Binds a variable-length, NUL-terminated string via getter/setter
    /// closures. Always disqualifies the definition from `use_mapping`,
    /// since the wire size isn't known until marshal time.
    pub fn add_string_v(
        &mut self,
        name: &str,
        get: impl Fn(&R, &mut Builder) + Send + 'static,
        set: impl Fn(&mut R, &mut Reader) -> Result<()> + Send + 'static,
    ) -> &mut Self {
        self.add_with_closures(name, "", DataType::StringV, get, set)
    }

    /// Binds a lat/lon/alt composite at a direct byte offset into `R`
    /// (preferred form, §9 Open Question 2).
    pub fn add_lat_lon_alt(&mut self, name: &str, offset: usize) -> &mut Self {
        self.push(name, "", DataType::LatLonAlt, 0.0, Accessor::Offset(offset))
    }

    /// Binds a lat/lon/alt composite via three independent scalar
    /// closures, for records that do not store the triple contiguously
    /// (§9 Open Question 2's explicit alternate constructor).
    pub fn add_lat_lon_alt_scalars(
        &mut self,
        name: &str,
        get: impl Fn(&R, &mut Builder) + Send + 'static,
        set: impl Fn(&mut R, &mut Reader) -> Result<()> + Send + 'static,
    ) -> &mut Self {
        self.add_with_closures(name, "", DataType::LatLonAlt, get, set)
    }

    /// Binds an x/y/z composite at a direct byte offset into `R`.
    pub fn add_xyz(&mut self, name: &str, offset: usize) -> &mut Self {
        self.push(name, "", DataType::Xyz, 0.0, Accessor::Offset(offset))
    }

    /// Binds a pitch/bank/heading composite at a direct byte offset into `R`.
    pub fn add_pbh(&mut self, name: &str, offset: usize) -> &mut Self {
        self.push(name, "", DataType::Pbh, 0.0, Accessor::Offset(offset))
    }

    /// Binds an initial-position composite at a direct byte offset into `R`.
    pub fn add_init_position(&mut self, name: &str, offset: usize) -> &mut Self {
        self.push(name, "", DataType::InitPosition, 0.0, Accessor::Offset(offset))
    }

    /// Binds a waypoint composite at a direct byte offset into `R`.
    pub fn add_waypoint(&mut self, name: &str, offset: usize) -> &mut Self {
        self.push(name, "", DataType::Waypoint, 0.0, Accessor::Offset(offset))
    }

    /// Binds a marker composite at a direct byte offset into `R`.
    pub fn add_marker(&mut self, name: &str, offset: usize) -> &mut Self {
        self.push(name, "", DataType::Marker, 0.0, Accessor::Offset(offset))
    }

    /// The bound fields, in registration order.
    pub fn fields(&self) -> &[Field<R>] {
        &self.fields
    }

    /// True iff every field uses a direct offset binding and the
    /// accumulated, in-order field sizes equal `sizeof(R)` (§4.5's
    /// algorithm). Only meaningful once every field has been added.
    pub fn use_mapping(&self) -> bool {
        !self.any_closures && !self.any_string_v && self.accumulated_offset == std::mem::size_of::<R>()
    }

    /// Wire size in bytes of one record. In mapping mode this is
    /// `sizeof(R)`; otherwise it is the sum of each field's fixed size
    /// (variable-length strings contribute their runtime length and are
    /// excluded from this static figure — callers measure those via the
    /// builder's length after marshalling).
    pub fn size(&self) -> usize {
        if self.use_mapping() {
            return std::mem::size_of::<R>();
        }
        self.fields
            .iter()
            .filter_map(|f| f.data_type.fixed_size())
            .sum()
    }

    /// Looks up a field's index by its datum id, for tagged reception.
    pub fn field_index_for_datum(&self, datum_id: u32) -> Option<usize> {
        self.datum_index.get(&datum_id).copied()
    }

    /// True if this definition assigns sequential datum ids (tagged
    /// reception); false if every field carries [`DatumId::UNUSED`].
    pub fn is_tagged(&self) -> bool {
        self.use_tagged
    }

    /// Wires every bound field to the host with a freshly allocated
    /// [`DefinitionId`], in registration order, and returns it. Callers
    /// register a definition once, before issuing any request that names it
    /// (§4.5, §6.1 `add_to_data_definition`).
    pub fn register<T: Transport>(&self, connection: &mut Connection<T>) -> Result<DefinitionId> {
        let def_id = connection.ids().next_definition_id()?;
        for field in &self.fields {
            let result = connection.transport_mut().add_to_data_definition(
                def_id,
                &field.name,
                &field.units,
                field.datum_id,
                field.epsilon,
            );
            connection.record_result(result)?;
        }
        Ok(def_id)
    }

    /// Writes one record into `builder`.
    ///
    /// In mapping mode this is a single raw copy of `record`'s own memory
    /// image; otherwise each field is marshalled in registration order.
    pub fn marshall(&self, builder: &mut Builder, record: &R) {
        if self.use_mapping() {
            let bytes = unsafe {
                std::slice::from_raw_parts(record as *const R as *const u8, std::mem::size_of::<R>())
            };
            builder.put_raw(bytes);
            return;
        }
        for field in &self.fields {
            match &field.accessor {
                Accessor::Offset(offset) => unsafe {
                    marshal_offset_field(builder, record, *offset, field.data_type);
                },
                Accessor::Closures { get, .. } => get(record, builder),
            }
        }
    }

    /// Reads one record in registration order (untagged form).
    pub fn unmarshall(&self, reader: &mut Reader<'_>, record: &mut R) -> Result<()> {
        if self.use_mapping() {
            let size = std::mem::size_of::<R>();
            let bytes = reader.read_raw(size)?;
            unsafe {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), record as *mut R as *mut u8, size);
            }
            return Ok(());
        }
        for field in &self.fields {
            match &field.accessor {
                Accessor::Offset(offset) => unsafe {
                    unmarshal_offset_field(reader, record, *offset, field.data_type)?;
                },
                Accessor::Closures { set, .. } => set(record, reader)?,
            }
        }
        Ok(())
    }

    /// Reads `entry_count` (datum-id, value) pairs in tagged form, looking
    /// each datum id up via [`DataDefinition::field_index_for_datum`] and
    /// writing through that field's own accessor (§4.5, §4.8: "tagged
    /// responses traverse the datum-id→accessor lookup").
    ///
    /// A datum id absent from this definition is surfaced as
    /// [`SimConnectError::MalformedFrame`]: without knowing the field's
    /// type there is no way to know how many bytes to skip, so recovery is
    /// impossible.
    pub fn unmarshall_tagged(&self, reader: &mut Reader<'_>, record: &mut R, entry_count: u32) -> Result<()> {
        for _ in 0..entry_count {
            let datum_id = reader.read_i32()? as u32;
            let index = self.field_index_for_datum(datum_id).ok_or(SimConnectError::MalformedFrame {
                declared: datum_id,
                actual: self.fields.len() as u32,
            })?;
            let field = &self.fields[index];
            match &field.accessor {
                Accessor::Offset(offset) => unsafe {
                    unmarshal_offset_field(reader, record, *offset, field.data_type)?;
                },
                Accessor::Closures { set, .. } => set(record, reader)?,
            }
        }
        Ok(())
    }
}

unsafe fn marshal_offset_field<R>(builder: &mut Builder, record: &R, offset: usize, data_type: DataType) {
    let base = record as *const R as *const u8;
    let field_ptr = base.add(offset);
    match data_type {
        DataType::Int32 => builder.put_i32(*(field_ptr as *const i32)),
        DataType::Int64 => builder.put_i64(*(field_ptr as *const i64)),
        DataType::Float32 => builder.put_f32(*(field_ptr as *const f32)),
        DataType::Float64 => builder.put_f64(*(field_ptr as *const f64)),
        DataType::StringN(n) => {
            builder.put_raw(std::slice::from_raw_parts(field_ptr, n as usize));
        }
        DataType::LatLonAlt | DataType::Xyz | DataType::Pbh => {
            builder.put_raw(std::slice::from_raw_parts(field_ptr, 24));
        }
        DataType::InitPosition => builder.put_raw(std::slice::from_raw_parts(field_ptr, 56)),
        DataType::Marker => builder.put_raw(std::slice::from_raw_parts(field_ptr, 32)),
        DataType::Waypoint => builder.put_raw(std::slice::from_raw_parts(field_ptr, 44)),
        DataType::StringV => unreachable!("variable-length strings cannot be offset-bound"),
    }
}

unsafe fn unmarshal_offset_field<R>(
    reader: &mut Reader<'_>,
    record: &mut R,
    offset: usize,
    data_type: DataType,
) -> Result<()> {
    let base = record as *mut R as *mut u8;
    let field_ptr = base.add(offset);
    match data_type {
        DataType::Int32 => *(field_ptr as *mut i32) = reader.read_i32()?,
        DataType::Int64 => *(field_ptr as *mut i64) = reader.read_i64()?,
        DataType::Float32 => *(field_ptr as *mut f32) = reader.read_f32()?,
        DataType::Float64 => *(field_ptr as *mut f64) = reader.read_f64()?,
        DataType::StringN(n) => {
            let bytes = reader.read_raw(n as usize)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), field_ptr, n as usize);
        }
        DataType::LatLonAlt | DataType::Xyz | DataType::Pbh => {
            let bytes = reader.read_raw(24)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), field_ptr, 24);
        }
        DataType::InitPosition => {
            let bytes = reader.read_raw(56)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), field_ptr, 56);
        }
        DataType::Marker => {
            let bytes = reader.read_raw(32)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), field_ptr, 32);
        }
        DataType::Waypoint => {
            let bytes = reader.read_raw(44)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), field_ptr, 44);
        }
        DataType::StringV => unreachable!("variable-length strings cannot be offset-bound"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Mixed {
        i: i32,
        l: i64,
        f: f32,
        d: f64,
        s: [u8; 8],
    }

    #[test]
    fn s1_mixed_mappable_round_trip() {
        let mut record = Mixed {
            i: 1234,
            l: 0x123456789ABCDEF0u64 as i64,
            f: 3.14,
            d: 2.718281828459,
            s: *b"ABC\0\0\0\0\0",
        };

        let mut def = DataDefinition::<Mixed>::new();
        def.add_int32("I", "number", field_offset!(Mixed, i));
        def.add_int64("L", "number", field_offset!(Mixed, l));
        def.add_float32("F", "number", field_offset!(Mixed, f), 0.0);
        def.add_float64("D", "number", field_offset!(Mixed, d), 0.0);
        def.add_stringn("S", 8, field_offset!(Mixed, s));

        assert!(def.use_mapping());
        assert_eq!(def.size(), std::mem::size_of::<Mixed>());

        let mut builder = Builder::new();
        def.marshall(&mut builder, &record);
        let bytes = builder.into_bytes();
        assert_eq!(bytes.len(), std::mem::size_of::<Mixed>());

        let raw = unsafe {
            std::slice::from_raw_parts(&record as *const Mixed as *const u8, std::mem::size_of::<Mixed>())
        };
        assert_eq!(bytes, raw);

        let mut roundtrip = Mixed {
            i: 0,
            l: 0,
            f: 0.0,
            d: 0.0,
            s: [0; 8],
        };
        let mut reader = Reader::new(&bytes);
        def.unmarshall(&mut reader, &mut roundtrip).unwrap();
        assert_eq!(roundtrip, record);

        // Mutating after marshalling must not affect the already-copied buffer.
        record.i = 0;
        assert_eq!(roundtrip.i, 1234);
    }

    #[derive(Default)]
    struct Aircraft {
        title: String,
        tail: String,
        atc_id: String,
        lat: f64,
        lon: f64,
        alt: f64,
        pos: (f64, f64, f64),
    }

    #[test]
    fn s2_non_mappable_with_variable_string() {
        let mut def = DataDefinition::<Aircraft>::new();
        def.add_string_v(
            "TITLE",
            |r, b| b.put_string_v(&r.title),
            |r, reader| {
                r.title = reader.read_string_v()?;
                Ok(())
            },
        );
        def.add_with_closures(
            "ATC TAIL NUMBER",
            "",
            DataType::StringN(32),
            |r, b| b.put_stringn(&r.tail, 32),
            |r, reader| {
                r.tail = reader.read_stringn(32)?;
                Ok(())
            },
        );
        def.add_with_closures(
            "ATC ID",
            "",
            DataType::StringN(64),
            |r, b| b.put_stringn(&r.atc_id, 64),
            |r, reader| {
                r.atc_id = reader.read_stringn(64)?;
                Ok(())
            },
        );
        def.add_lat_lon_alt_scalars(
            "LAT LON ALT",
            |r, b| b.put_lat_lon_alt(r.lat, r.lon, r.alt),
            |r, reader| {
                let (lat, lon, alt) = reader.read_lat_lon_alt()?;
                r.lat = lat;
                r.lon = lon;
                r.alt = alt;
                Ok(())
            },
        );
        def.add_lat_lon_alt_scalars(
            "STRUCT LATLONALT",
            |r, b| b.put_lat_lon_alt(r.pos.0, r.pos.1, r.pos.2),
            |r, reader| {
                r.pos = reader.read_lat_lon_alt()?;
                Ok(())
            },
        );

        assert!(!def.use_mapping());

        let record = Aircraft {
            title: "Cessna 404 Titan".to_string(),
            tail: "PH-BLA".to_string(),
            atc_id: "PH-BLA".to_string(),
            lat: 52.383917,
            lon: 5.277781,
            alt: 10000.0,
            pos: (52.37278, 4.89361, 7.0),
        };

        let mut builder = Builder::new();
        def.marshall(&mut builder, &record);
        let bytes = builder.into_bytes();
        assert_eq!(bytes.len(), 17 + 32 + 64 + 24 + 24);

        let mut roundtrip = Aircraft::default();
        let mut reader = Reader::new(&bytes);
        def.unmarshall(&mut reader, &mut roundtrip).unwrap();

        assert_eq!(roundtrip.title, record.title);
        assert_eq!(roundtrip.tail, record.tail);
        assert_eq!(roundtrip.atc_id, record.atc_id);
        assert_eq!(roundtrip.lat, record.lat);
        assert_eq!(roundtrip.pos, record.pos);
    }

    #[test]
    fn untagged_definition_assigns_unused_sentinel() {
        #[repr(C)]
        struct One {
            v: i32,
        }
        let mut def = DataDefinition::<One>::new();
        def.add_int32("V", "number", field_offset!(One, v));
        assert_eq!(def.fields()[0].datum_id, DatumId::UNUSED);
    }

    #[test]
    fn tagged_definition_assigns_sequential_datum_ids() {
        #[repr(C)]
        struct Two {
            a: i32,
            b: i32,
        }
        let mut def = DataDefinition::<Two>::new_tagged();
        def.add_int32("A", "number", field_offset!(Two, a));
        def.add_int32("B", "number", field_offset!(Two, b));
        assert_eq!(def.fields()[0].datum_id, 0);
        assert_eq!(def.fields()[1].datum_id, 1);
        assert_eq!(def.field_index_for_datum(1), Some(1));
    }

    #[test]
    fn tagged_unmarshall_reads_sparse_out_of_order_fields() {
        #[repr(C)]
        #[derive(Default)]
        struct Two {
            a: i32,
            b: i32,
        }
        let mut def = DataDefinition::<Two>::new_tagged();
        def.add_int32("A", "number", field_offset!(Two, a));
        def.add_int32("B", "number", field_offset!(Two, b));

        // Only datum 1 ("B") arrives, out of order relative to declaration.
        let mut b = Builder::new();
        b.put_i32(1);
        b.put_i32(77);
        let bytes = b.into_bytes();
        let mut reader = Reader::new(&bytes);

        let mut record = Two::default();
        def.unmarshall_tagged(&mut reader, &mut record, 1).unwrap();
        assert_eq!(record.a, 0);
        assert_eq!(record.b, 77);
    }

    #[test]
    fn tagged_unmarshall_rejects_unknown_datum_id() {
        #[repr(C)]
        #[derive(Default)]
        struct One {
            v: i32,
        }
        let def = DataDefinition::<One>::new_tagged();
        let mut b = Builder::new();
        b.put_i32(42);
        let bytes = b.into_bytes();
        let mut reader = Reader::new(&bytes);
        let mut record = One::default();
        let err = def.unmarshall_tagged(&mut reader, &mut record, 1).unwrap_err();
        assert!(matches!(err, SimConnectError::MalformedFrame { .. }));
    }
}
