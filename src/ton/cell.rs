//! Cells and the bag-of-cells container.
//!
//! Every ledger object (transactions, messages, payloads) is a tree of cells. A cell holds up to
//! 1023 data bits and up to four references to other cells. APIs ship such trees as a
//! "bag of cells" (BOC): a flat, topologically ordered list of serialized cells where every
//! reference points forward.
//!
//! `CellSlice` is the read cursor used by the typed decoders in [`super::tlb`] and by the
//! message decoder; `CellBuilder` covers the few places where a cell must be produced (get-method
//! arguments and test fixtures).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;
use thiserror::Error;

use super::Address;

const BOC_GENERIC: u32 = 0xb5ee_9c72;
const BOC_INDEXED: u32 = 0x68ff_65f3;
const BOC_INDEXED_CRC32: u32 = 0xacc3_a728;

const MAX_DATA_BITS: usize = 1023;
const MAX_REFS: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CellError {
	#[error("malformed bag of cells: {0}")]
	Boc(String),
	#[error("not enough data bits: requested {requested}, remaining {remaining}")]
	NotEnoughBits { requested: usize, remaining: usize },
	#[error("not enough references in cell")]
	NotEnoughRefs,
	#[error("unexpected {what} tag {tag:#b}")]
	InvalidTag { what: &'static str, tag: u64 },
	#[error("value does not fit: {0}")]
	Overflow(&'static str),
	#[error("string is not valid UTF-8")]
	InvalidUtf8,
	#[error("cell overflow: {bits} bits, {refs} refs")]
	CellOverflow { bits: usize, refs: usize },
}

/// A single cell: data bits plus references.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cell {
	data: Vec<u8>,
	bit_len: usize,
	refs: Vec<Arc<Cell>>,
	exotic: bool,
}

impl Cell {
	pub fn bit_len(&self) -> usize {
		self.bit_len
	}

	pub fn refs(&self) -> &[Arc<Cell>] {
		&self.refs
	}

	pub fn is_exotic(&self) -> bool {
		self.exotic
	}

	pub fn is_empty(&self) -> bool {
		self.bit_len == 0 && self.refs.is_empty()
	}

	/// Starts reading the cell from its first bit and first reference.
	pub fn parse(&self) -> CellSlice<'_> {
		CellSlice {
			cell: self,
			bit_pos: 0,
			ref_pos: 0,
		}
	}

	fn bit(&self, index: usize) -> bool {
		(self.data[index / 8] >> (7 - index % 8)) & 1 == 1
	}

	pub fn from_boc_base64(encoded: &str) -> Result<Arc<Cell>, CellError> {
		let bytes = STANDARD
			.decode(encoded.trim())
			.map_err(|e| CellError::Boc(format!("invalid base64: {}", e)))?;
		Self::from_boc(&bytes)
	}

	/// Deserializes a bag of cells and returns its first root.
	pub fn from_boc(bytes: &[u8]) -> Result<Arc<Cell>, CellError> {
		let mut reader = ByteReader::new(bytes);

		let magic = reader.read_be(4)? as u32;
		let (has_idx, has_crc, size) = match magic {
			BOC_GENERIC => {
				let flags = reader.byte()?;
				(flags & 0x80 != 0, flags & 0x40 != 0, (flags & 0x07) as usize)
			}
			BOC_INDEXED => (true, false, (reader.byte()? & 0x07) as usize),
			BOC_INDEXED_CRC32 => (true, true, (reader.byte()? & 0x07) as usize),
			other => return Err(CellError::Boc(format!("unknown magic {:#010x}", other))),
		};
		if size == 0 || size > 4 {
			return Err(CellError::Boc(format!("invalid reference size {}", size)));
		}

		let off_bytes = reader.byte()? as usize;
		if off_bytes == 0 || off_bytes > 8 {
			return Err(CellError::Boc(format!("invalid offset size {}", off_bytes)));
		}

		let cell_count = reader.read_be(size)? as usize;
		let root_count = reader.read_be(size)? as usize;
		let absent = reader.read_be(size)? as usize;
		let total_size = reader.read_be(off_bytes)? as usize;

		if root_count == 0 || root_count + absent > cell_count {
			return Err(CellError::Boc(format!(
				"invalid counts: {} cells, {} roots, {} absent",
				cell_count, root_count, absent
			)));
		}
		if absent != 0 {
			return Err(CellError::Boc("absent cells are not supported".to_string()));
		}

		let mut roots = Vec::with_capacity(root_count.min(MAX_REFS));
		for _ in 0..root_count {
			roots.push(reader.read_be(size)? as usize);
		}
		if has_idx {
			reader.take(cell_count * off_bytes)?;
		}
		let cell_data = reader.take(total_size)?;
		if has_crc {
			// crc32c trailer, not verified
			reader.take(4)?;
		}

		let mut raw_cells = Vec::with_capacity(cell_count.min(cell_data.len() / 2 + 1));
		let mut cells_reader = ByteReader::new(cell_data);
		for _ in 0..cell_count {
			raw_cells.push(RawCell::read(&mut cells_reader, size)?);
		}

		let mut built: Vec<Option<Arc<Cell>>> = vec![None; cell_count];
		for (index, raw) in raw_cells.into_iter().enumerate().rev() {
			let mut refs = Vec::with_capacity(raw.refs.len());
			for child in raw.refs {
				if child <= index || child >= cell_count {
					return Err(CellError::Boc(format!(
						"cell {} references {} which is not after it",
						index, child
					)));
				}
				let child_cell = built[child]
					.clone()
					.ok_or_else(|| CellError::Boc(format!("cell {} was not built", child)))?;
				refs.push(child_cell);
			}
			built[index] = Some(Arc::new(Cell {
				data: raw.data,
				bit_len: raw.bit_len,
				refs,
				exotic: raw.exotic,
			}));
		}

		let root = roots[0];
		built
			.get(root)
			.cloned()
			.flatten()
			.ok_or_else(|| CellError::Boc(format!("root index {} out of range", root)))
	}

	/// Serializes the tree rooted at this cell as a single-root bag of cells without index or
	/// checksum.
	pub fn to_boc(&self) -> Vec<u8> {
		let mut order: Vec<(&Cell, Vec<usize>)> = Vec::new();
		flatten(self, &mut order);

		let size = bytes_needed(order.len() as u64);
		let mut cells_bytes = Vec::new();
		for (cell, children) in &order {
			let full_bytes = cell.bit_len / 8;
			let all_bytes = cell.bit_len.div_ceil(8);
			cells_bytes.push(cell.refs.len() as u8 | if cell.exotic { 8 } else { 0 });
			cells_bytes.push((full_bytes + all_bytes) as u8);

			let mut data = cell.data[..all_bytes].to_vec();
			let used = cell.bit_len % 8;
			if used != 0 {
				if let Some(last) = data.last_mut() {
					*last |= 0x80 >> used;
				}
			}
			cells_bytes.extend_from_slice(&data);
			for child in children {
				push_be(&mut cells_bytes, *child as u64, size);
			}
		}

		let off_bytes = bytes_needed(cells_bytes.len() as u64);
		let mut out = Vec::with_capacity(cells_bytes.len() + 32);
		out.extend_from_slice(&BOC_GENERIC.to_be_bytes());
		out.push(size as u8);
		out.push(off_bytes as u8);
		push_be(&mut out, order.len() as u64, size);
		push_be(&mut out, 1, size);
		push_be(&mut out, 0, size);
		push_be(&mut out, cells_bytes.len() as u64, off_bytes);
		push_be(&mut out, 0, size);
		out.extend_from_slice(&cells_bytes);
		out
	}

	pub fn to_boc_base64(&self) -> String {
		STANDARD.encode(self.to_boc())
	}
}

fn flatten<'c>(cell: &'c Cell, out: &mut Vec<(&'c Cell, Vec<usize>)>) -> usize {
	let index = out.len();
	out.push((cell, Vec::new()));
	let children = cell.refs.iter().map(|r| flatten(r, out)).collect();
	out[index].1 = children;
	index
}

fn bytes_needed(value: u64) -> usize {
	let bits = 64 - value.leading_zeros() as usize;
	bits.div_ceil(8).max(1)
}

fn push_be(out: &mut Vec<u8>, value: u64, width: usize) {
	out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
}

struct RawCell {
	data: Vec<u8>,
	bit_len: usize,
	refs: Vec<usize>,
	exotic: bool,
}

impl RawCell {
	fn read(reader: &mut ByteReader<'_>, ref_size: usize) -> Result<Self, CellError> {
		let d1 = reader.byte()?;
		let d2 = reader.byte()?;

		let ref_count = (d1 & 0x07) as usize;
		let exotic = d1 & 0x08 != 0;
		let with_hashes = d1 & 0x10 != 0;
		let level_mask = d1 >> 5;
		if ref_count > MAX_REFS {
			return Err(CellError::Boc(format!("cell has {} references", ref_count)));
		}
		if with_hashes {
			let hash_count = level_mask.count_ones() as usize + 1;
			reader.take(hash_count * (32 + 2))?;
		}

		let data_len = (d2 as usize).div_ceil(2);
		let mut data = reader.take(data_len)?.to_vec();
		let bit_len = if d2 % 2 == 0 {
			data_len * 8
		} else {
			let last = data[data_len - 1];
			if last == 0 {
				return Err(CellError::Boc("missing completion tag".to_string()));
			}
			let padding = last.trailing_zeros() as usize + 1;
			data[data_len - 1] &= 0xffu8 << padding;
			data_len * 8 - padding
		};

		let mut refs = Vec::with_capacity(ref_count);
		for _ in 0..ref_count {
			refs.push(reader.read_be(ref_size)? as usize);
		}

		Ok(Self {
			data,
			bit_len,
			refs,
			exotic,
		})
	}
}

struct ByteReader<'a> {
	data: &'a [u8],
	pos: usize,
}

impl<'a> ByteReader<'a> {
	fn new(data: &'a [u8]) -> Self {
		Self { data, pos: 0 }
	}

	fn take(&mut self, n: usize) -> Result<&'a [u8], CellError> {
		let end = self
			.pos
			.checked_add(n)
			.filter(|end| *end <= self.data.len())
			.ok_or_else(|| CellError::Boc("unexpected end of data".to_string()))?;
		let slice = &self.data[self.pos..end];
		self.pos = end;
		Ok(slice)
	}

	fn byte(&mut self) -> Result<u8, CellError> {
		Ok(self.take(1)?[0])
	}

	fn read_be(&mut self, n: usize) -> Result<u64, CellError> {
		Ok(self
			.take(n)?
			.iter()
			.fold(0u64, |acc, b| (acc << 8) | *b as u64))
	}
}

/// Read cursor over one cell.
#[derive(Debug, Clone)]
pub struct CellSlice<'a> {
	cell: &'a Cell,
	bit_pos: usize,
	ref_pos: usize,
}

impl<'a> CellSlice<'a> {
	pub fn remaining_bits(&self) -> usize {
		self.cell.bit_len - self.bit_pos
	}

	pub fn remaining_refs(&self) -> usize {
		self.cell.refs.len() - self.ref_pos
	}

	pub fn is_empty(&self) -> bool {
		self.remaining_bits() == 0 && self.remaining_refs() == 0
	}

	fn ensure_bits(&self, requested: usize) -> Result<(), CellError> {
		let remaining = self.remaining_bits();
		if requested > remaining {
			return Err(CellError::NotEnoughBits {
				requested,
				remaining,
			});
		}
		Ok(())
	}

	pub fn load_bit(&mut self) -> Result<bool, CellError> {
		self.ensure_bits(1)?;
		let bit = self.cell.bit(self.bit_pos);
		self.bit_pos += 1;
		Ok(bit)
	}

	pub fn skip_bits(&mut self, n: usize) -> Result<(), CellError> {
		self.ensure_bits(n)?;
		self.bit_pos += n;
		Ok(())
	}

	/// Unsigned big-endian integer of up to 128 bits.
	pub fn load_u128(&mut self, bits: usize) -> Result<u128, CellError> {
		if bits > 128 {
			return Err(CellError::Overflow("integers wider than 128 bits"));
		}
		self.ensure_bits(bits)?;
		let mut value = 0u128;
		for _ in 0..bits {
			value = (value << 1) | self.cell.bit(self.bit_pos) as u128;
			self.bit_pos += 1;
		}
		Ok(value)
	}

	pub fn load_uint(&mut self, bits: usize) -> Result<u64, CellError> {
		if bits > 64 {
			return Err(CellError::Overflow("unsigned integers wider than 64 bits"));
		}
		Ok(self.load_u128(bits)? as u64)
	}

	/// Two's complement signed integer of up to 64 bits.
	pub fn load_int(&mut self, bits: usize) -> Result<i64, CellError> {
		if bits == 0 {
			return Ok(0);
		}
		if bits > 64 {
			return Err(CellError::Overflow("signed integers wider than 64 bits"));
		}
		let raw = self.load_uint(bits)?;
		let shift = 64 - bits;
		Ok(((raw << shift) as i64) >> shift)
	}

	pub fn load_bytes(&mut self, n: usize) -> Result<Vec<u8>, CellError> {
		self.ensure_bits(n * 8)?;
		(0..n).map(|_| self.load_uint(8).map(|b| b as u8)).collect()
	}

	/// `VarUInteger n` where `len_bits` is the width of the byte-length prefix.
	pub fn load_var_uint(&mut self, len_bits: usize) -> Result<u128, CellError> {
		let len = self.load_uint(len_bits)? as usize;
		self.load_u128(len * 8)
	}

	/// `Grams` / `Coins`, i.e. `VarUInteger 16`.
	pub fn load_coins(&mut self) -> Result<u128, CellError> {
		self.load_var_uint(4)
	}

	pub fn load_ref(&mut self) -> Result<CellSlice<'a>, CellError> {
		Ok(self.load_ref_cell()?.parse())
	}

	pub fn load_ref_cell(&mut self) -> Result<&'a Arc<Cell>, CellError> {
		let cell: &'a Cell = self.cell;
		let child = cell.refs.get(self.ref_pos).ok_or(CellError::NotEnoughRefs)?;
		self.ref_pos += 1;
		Ok(child)
	}

	pub fn load_maybe_ref(&mut self) -> Result<Option<CellSlice<'a>>, CellError> {
		if self.load_bit()? {
			Ok(Some(self.load_ref()?))
		} else {
			Ok(None)
		}
	}

	/// `HashmapE`: presence bit plus optional root reference; the content is not needed.
	pub fn skip_dict(&mut self) -> Result<(), CellError> {
		if self.load_bit()? {
			self.load_ref_cell()?;
		}
		Ok(())
	}

	/// Snake-encoded UTF-8 string: whole bytes in this cell, continued in the first reference.
	pub fn load_string_snake(&mut self) -> Result<String, CellError> {
		let mut bytes = Vec::new();
		let mut current = self.clone();
		loop {
			let remaining = current.remaining_bits();
			if remaining % 8 != 0 {
				return Err(CellError::NotEnoughBits {
					requested: remaining.next_multiple_of(8),
					remaining,
				});
			}
			bytes.extend(current.load_bytes(remaining / 8)?);
			if current.remaining_refs() == 0 {
				break;
			}
			current = current.load_ref()?;
		}
		self.bit_pos = self.cell.bit_len;
		self.ref_pos = self.cell.refs.len();
		String::from_utf8(bytes).map_err(|_| CellError::InvalidUtf8)
	}

	/// Copies the unread remainder into a standalone cell.
	pub fn to_cell(&self) -> Cell {
		let mut builder = CellBuilder::new();
		for index in self.bit_pos..self.cell.bit_len {
			builder.store_bit(self.cell.bit(index));
		}
		for child in &self.cell.refs[self.ref_pos..] {
			builder.store_ref(child.clone());
		}
		Cell {
			data: builder.data,
			bit_len: builder.bit_len,
			refs: builder.refs,
			exotic: false,
		}
	}
}

/// Write cursor producing a new cell.
#[derive(Debug, Clone, Default)]
pub struct CellBuilder {
	data: Vec<u8>,
	bit_len: usize,
	refs: Vec<Arc<Cell>>,
}

impl CellBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn store_bit(&mut self, bit: bool) -> &mut Self {
		if self.bit_len % 8 == 0 {
			self.data.push(0);
		}
		if bit {
			let last = self.data.len() - 1;
			self.data[last] |= 0x80 >> (self.bit_len % 8);
		}
		self.bit_len += 1;
		self
	}

	/// Stores the low `bits` bits of `value`, most significant first.
	pub fn store_uint(&mut self, value: u128, bits: usize) -> &mut Self {
		for shift in (0..bits).rev() {
			let bit = shift < 128 && (value >> shift) & 1 == 1;
			self.store_bit(bit);
		}
		self
	}

	pub fn store_int(&mut self, value: i64, bits: usize) -> &mut Self {
		self.store_uint(value as u64 as u128, bits)
	}

	pub fn store_bytes(&mut self, bytes: &[u8]) -> &mut Self {
		for byte in bytes {
			self.store_uint(*byte as u128, 8);
		}
		self
	}

	pub fn store_coins(&mut self, value: u128) -> &mut Self {
		let len = (128 - value.leading_zeros() as usize).div_ceil(8);
		self.store_uint(len as u128, 4);
		self.store_uint(value, len * 8)
	}

	/// `addr_std$10 anycast:(Maybe Anycast) workchain_id:int8 address:bits256`.
	pub fn store_address(&mut self, address: &Address) -> &mut Self {
		self.store_uint(0b10, 2);
		self.store_bit(false);
		self.store_int(address.workchain as i64, 8);
		self.store_bytes(&address.hash)
	}

	pub fn store_ref(&mut self, cell: Arc<Cell>) -> &mut Self {
		self.refs.push(cell);
		self
	}

	pub fn build(&self) -> Result<Cell, CellError> {
		if self.bit_len > MAX_DATA_BITS || self.refs.len() > MAX_REFS {
			return Err(CellError::CellOverflow {
				bits: self.bit_len,
				refs: self.refs.len(),
			});
		}
		Ok(Cell {
			data: self.data.clone(),
			bit_len: self.bit_len,
			refs: self.refs.clone(),
			exotic: false,
		})
	}
}
