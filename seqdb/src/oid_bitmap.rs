//! # OID inclusion bitmap
//!
//! When any volume occurrence is filtered, or the caller restricts the
//! database with a GI list, the set of included OIDs is materialized as a
//! packed bit vector, most significant bit first within each byte. The
//! vector is sized for every OID of the volume set, rounded up to whole
//! 32-bit words, plus eight bytes of padding so that shifted writes of the
//! final source byte never need a bounds check.
//!
//! After construction `num_oids` is trimmed so that the last included OID
//! is `num_oids - 1`.
use std::path::PathBuf;

use byteorder::{BigEndian, ByteOrder};
use fxhash::FxHashMap;
use log::info;

use seqdb_core::{Oid, Result, SeqDbError, VolumeFilter};
use seqdb_io::{Atlas, AtlasLock, GiList, OidMaskFile};

use crate::resolver::GiOidResolver;
use crate::volset::VolumeSet;

pub struct OidBitmap {
    bits: Vec<u8>,
    num_oids: Oid,
}

impl OidBitmap {
    /// An empty bitmap able to hold `num_oids` bits.
    pub fn with_capacity(num_oids: Oid) -> Self {
        let byte_length = (num_oids as usize).div_ceil(32) * 4 + 8;
        OidBitmap {
            bits: vec![0; byte_length],
            num_oids,
        }
    }

    /// Builds the bitmap for a volume set.
    ///
    /// Each occurrence contributes its filtered OIDs; a user GI list then
    /// removes every OID it does not name. An empty user list excludes
    /// everything.
    pub fn build(
        volset: &VolumeSet,
        user_gis: Option<&GiList>,
        resolver: Option<&dyn GiOidResolver>,
        atlas: &Atlas,
        lock: &mut AtlasLock<'_>,
    ) -> Result<Self> {
        let mut bitmap = OidBitmap::with_capacity(volset.num_oids());
        let mut gi_files: FxHashMap<PathBuf, GiList> = FxHashMap::default();

        for occ in volset.occurrences() {
            let volume = volset.volume_at(occ);
            let Some((lo, hi)) = occ.filter.range().clip(volume.num_oids()) else {
                continue;
            };
            match &occ.filter {
                VolumeFilter::Full | VolumeFilter::Range(_) => {
                    bitmap.set_bit_range(occ.start + lo, occ.start + hi);
                }
                VolumeFilter::OidMask { path, .. } => {
                    let mask = OidMaskFile::open(atlas, path, lock)?;
                    bitmap.or_mask_bits(&mask, occ.start, lo, hi);
                }
                VolumeFilter::GiList { path, .. } => {
                    let resolver = resolver.ok_or_else(|| SeqDbError::MissingGiResolver(path.clone()))?;
                    if !gi_files.contains_key(path) {
                        gi_files.insert(path.clone(), GiList::read(atlas, path, lock)?);
                    }
                    let gis = gi_files.get(path).map(GiList::gis).unwrap_or_default();
                    for local in resolver.resolve(volume, gis)?.into_iter().flatten() {
                        if (lo..hi).contains(&local) {
                            bitmap.set_bit(occ.start + local);
                        }
                    }
                }
            }
        }

        if let Some(list) = user_gis {
            bitmap.apply_user_gi_list(volset, list, resolver)?;
        }

        bitmap.trim();
        info!(
            "Built OID bitmap: {} of {} OIDs included, last at {}",
            bitmap.count_included(),
            volset.num_oids(),
            bitmap.num_oids
        );
        Ok(bitmap)
    }

    fn apply_user_gi_list(
        &mut self,
        volset: &VolumeSet,
        list: &GiList,
        resolver: Option<&dyn GiOidResolver>,
    ) -> Result<()> {
        if list.is_empty() {
            self.clear_bit_range(0, self.num_oids);
            self.num_oids = 0;
            return Ok(());
        }
        let resolver = resolver.ok_or_else(|| {
            SeqDbError::MissingGiResolver(list.path().map(PathBuf::from).unwrap_or_default())
        })?;

        let mut listed = OidBitmap::with_capacity(self.num_oids);
        let mut resolved: FxHashMap<usize, Vec<Option<Oid>>> = FxHashMap::default();
        for occ in volset.occurrences() {
            if !resolved.contains_key(&occ.volume) {
                let oids = resolver.resolve(volset.volume_at(occ), list.gis())?;
                resolved.insert(occ.volume, oids);
            }
            let oids = resolved.get(&occ.volume).map(Vec::as_slice).unwrap_or_default();
            for &local in oids.iter().flatten() {
                if local < occ.num_oids() {
                    listed.set_bit(occ.start + local);
                }
            }
        }

        for (dst, src) in self.bits.iter_mut().zip(listed.bits.iter()) {
            *dst &= *src;
        }
        Ok(())
    }

    pub fn num_oids(&self) -> Oid {
        self.num_oids
    }

    pub fn is_included(&self, oid: Oid) -> bool {
        oid < self.num_oids && self.bit(oid)
    }

    fn bit(&self, oid: Oid) -> bool {
        self.bits[(oid / 8) as usize] & (0x80 >> (oid % 8)) != 0
    }

    pub fn set_bit(&mut self, oid: Oid) {
        self.bits[(oid / 8) as usize] |= 0x80 >> (oid % 8);
    }

    fn clear_bit(&mut self, oid: Oid) {
        self.bits[(oid / 8) as usize] &= !(0x80 >> (oid % 8));
    }

    /// Sets every bit in `[start, end)`.
    pub fn set_bit_range(&mut self, start: Oid, end: Oid) {
        let mut oid = start;
        while oid < end && oid % 8 != 0 {
            self.set_bit(oid);
            oid += 1;
        }
        let whole_end = end - end % 8;
        if oid < whole_end {
            self.bits[(oid / 8) as usize..(whole_end / 8) as usize].fill(0xff);
            oid = whole_end;
        }
        while oid < end {
            self.set_bit(oid);
            oid += 1;
        }
    }

    /// Clears every bit in `[start, end)`.
    pub fn clear_bit_range(&mut self, start: Oid, end: Oid) {
        for oid in start..end {
            self.clear_bit(oid);
        }
    }

    /// ORs mask bits `[lo, hi)` into the bitmap, placing mask bit `i` at
    /// global OID `start + i`.
    ///
    /// Mask bits at or past the mask's own OID count are never copied.
    pub fn or_mask_bits(&mut self, mask: &OidMaskFile, start: Oid, lo: Oid, hi: Oid) {
        let hi = hi.min(mask.num_oids());
        if lo >= hi {
            return;
        }
        let base = (start / 8) as usize;
        let shift = start % 8;

        if shift == 0 && lo % 8 == 0 {
            let first = (lo / 8) as usize;
            let whole_end = (hi / 8) as usize;
            let src = mask.bits();
            let copy_end = whole_end.min(src.len()).max(first);

            let mut j = first;
            if start % 32 == 0 && first % 4 == 0 {
                while j + 4 <= copy_end {
                    let dst = &mut self.bits[base + j..base + j + 4];
                    let word = BigEndian::read_u32(dst) | BigEndian::read_u32(&src[j..j + 4]);
                    BigEndian::write_u32(dst, word);
                    j += 4;
                }
            }
            while j < copy_end {
                self.bits[base + j] |= src[j];
                j += 1;
            }
            if hi % 8 != 0 {
                self.bits[base + whole_end] |= mask.byte(whole_end) & keep_mask(whole_end, lo, hi);
            }
            return;
        }

        let first = (lo / 8) as usize;
        let last = hi.div_ceil(8) as usize;
        for j in first..last {
            let byte = mask.byte(j) & keep_mask(j, lo, hi);
            if byte == 0 {
                continue;
            }
            let spread = (byte as u16) << (8 - shift);
            self.bits[base + j] |= (spread >> 8) as u8;
            self.bits[base + j + 1] |= spread as u8;
        }
    }

    /// Drops trailing excluded OIDs from the count.
    fn trim(&mut self) {
        while self.num_oids > 0 && !self.bit(self.num_oids - 1) {
            self.num_oids -= 1;
        }
    }

    /// The first included OID at or after `oid`.
    pub fn find_next_included(&self, oid: Oid) -> Option<Oid> {
        let mut oid = oid;
        while oid < self.num_oids {
            if oid % 32 == 0 {
                let at = (oid / 8) as usize;
                if self.bits[at..at + 4].iter().all(|&b| b == 0) {
                    match oid.checked_add(32) {
                        Some(next) => oid = next,
                        None => break,
                    }
                    continue;
                }
            }
            if self.bit(oid) {
                return Some(oid);
            }
            oid += 1;
        }
        None
    }

    /// Number of included OIDs.
    pub fn count_included(&self) -> u64 {
        let whole = (self.num_oids / 8) as usize;
        let mut count: u64 = self.bits[..whole].iter().map(|b| b.count_ones() as u64).sum();
        for oid in (whole as Oid * 8)..self.num_oids {
            count += self.bit(oid) as u64;
        }
        count
    }
}

/// Bits of mask byte `j` whose local index lies in `[lo, hi)`.
fn keep_mask(j: usize, lo: Oid, hi: Oid) -> u8 {
    let first = j as Oid * 8;
    let mut keep = 0xffu8;
    if lo > first {
        keep &= 0xff >> (lo - first);
    }
    if hi < first + 8 {
        keep &= !(0xffu8 >> (hi - first));
    }
    keep
}
