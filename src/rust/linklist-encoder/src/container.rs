// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Hierarchical binary container holding encoded instrument data.
//!
//! A container is a tree of named groups. Every group has attributes,
//! datasets and subgroups, each kept in insertion order so that encoding the
//! same tree always yields the same bytes.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! file    := "AWGC" u16:version group
//! group   := u32:n (name data){n} u32:n (name data){n} u32:n (name group){n}
//! name    := u16:len utf8{len}
//! data    := u8:tag u32:count value{count}
//! ```

use anyhow::anyhow;
use indexmap::IndexMap;

use crate::Result;

const MAGIC: &[u8; 4] = b"AWGC";
pub const CONTAINER_VERSION: u16 = 1;

const TAG_F64: u8 = 1;
const TAG_I16: u8 = 2;
const TAG_U16: u8 = 3;

/// Typed array stored as an attribute or dataset. Scalars are one-element arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    F64(Vec<f64>),
    I16(Vec<i16>),
    U16(Vec<u16>),
}

impl Data {
    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            Data::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<&[i16]> {
        match self {
            Data::I16(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<&[u16]> {
        match self {
            Data::U16(v) => Some(v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Data::F64(v) => v.len(),
            Data::I16(v) => v.len(),
            Data::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub attributes: IndexMap<String, Data>,
    pub datasets: IndexMap<String, Data>,
    pub groups: IndexMap<String, Group>,
}

impl Group {
    pub fn new() -> Self {
        Group::default()
    }

    pub fn set_attribute<S: Into<String>>(&mut self, name: S, data: Data) {
        self.attributes.insert(name.into(), data);
    }

    pub fn add_dataset<S: Into<String>>(&mut self, name: S, data: Data) {
        self.datasets.insert(name.into(), data);
    }

    /// Get or create the subgroup `name`.
    pub fn group_mut<S: Into<String>>(&mut self, name: S) -> &mut Group {
        self.groups.entry(name.into()).or_default()
    }

    pub fn group(&self, name: &str) -> Result<&Group> {
        self.groups
            .get(name)
            .ok_or_else(|| anyhow!("Container has no group '{name}'.").into())
    }

    pub fn attribute(&self, name: &str) -> Result<&Data> {
        self.attributes
            .get(name)
            .ok_or_else(|| anyhow!("Container has no attribute '{name}'.").into())
    }

    pub fn dataset(&self, name: &str) -> Result<&Data> {
        self.datasets
            .get(name)
            .ok_or_else(|| anyhow!("Container has no dataset '{name}'.").into())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&CONTAINER_VERSION.to_le_bytes());
        write_group(&mut bytes, self);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Group> {
        let mut reader = Reader { bytes, position: 0 };
        if reader.take(MAGIC.len())? != MAGIC {
            return Err(anyhow!("Not a waveform container: bad magic.").into());
        }
        let version = reader.u16()?;
        if version != CONTAINER_VERSION {
            return Err(anyhow!("Unsupported container version {version}.").into());
        }
        let group = reader.group()?;
        if reader.position != bytes.len() {
            return Err(anyhow!(
                "Trailing {} bytes after container.",
                bytes.len() - reader.position
            )
            .into());
        }
        Ok(group)
    }
}

fn write_name(bytes: &mut Vec<u8>, name: &str) {
    bytes.extend_from_slice(&(name.len() as u16).to_le_bytes());
    bytes.extend_from_slice(name.as_bytes());
}

fn write_data(bytes: &mut Vec<u8>, data: &Data) {
    let tag = match data {
        Data::F64(_) => TAG_F64,
        Data::I16(_) => TAG_I16,
        Data::U16(_) => TAG_U16,
    };
    bytes.push(tag);
    bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
    match data {
        Data::F64(v) => v.iter().for_each(|x| bytes.extend_from_slice(&x.to_le_bytes())),
        Data::I16(v) => v.iter().for_each(|x| bytes.extend_from_slice(&x.to_le_bytes())),
        Data::U16(v) => v.iter().for_each(|x| bytes.extend_from_slice(&x.to_le_bytes())),
    }
}

fn write_group(bytes: &mut Vec<u8>, group: &Group) {
    for items in [&group.attributes, &group.datasets] {
        bytes.extend_from_slice(&(items.len() as u32).to_le_bytes());
        for (name, data) in items {
            write_name(bytes, name);
            write_data(bytes, data);
        }
    }
    bytes.extend_from_slice(&(group.groups.len() as u32).to_le_bytes());
    for (name, subgroup) in group.groups.iter() {
        write_name(bytes, name);
        write_group(bytes, subgroup);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| anyhow!("Container truncated at byte {}.", self.position))?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn name(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| anyhow!("Invalid name in container: {e}").into())
    }

    fn data(&mut self) -> Result<Data> {
        let tag = self.take(1)?[0];
        let count = self.u32()? as usize;
        let data = match tag {
            TAG_F64 => Data::F64(
                (0..count)
                    .map(|_| -> Result<f64> { Ok(f64::from_le_bytes(self.array()?)) })
                    .collect::<Result<_>>()?,
            ),
            TAG_I16 => Data::I16(
                (0..count)
                    .map(|_| -> Result<i16> { Ok(i16::from_le_bytes(self.array()?)) })
                    .collect::<Result<_>>()?,
            ),
            TAG_U16 => Data::U16(
                (0..count)
                    .map(|_| -> Result<u16> { Ok(u16::from_le_bytes(self.array()?)) })
                    .collect::<Result<_>>()?,
            ),
            other => return Err(anyhow!("Unknown data tag {other} in container.").into()),
        };
        Ok(data)
    }

    fn items(&mut self) -> Result<IndexMap<String, Data>> {
        let n = self.u32()?;
        let mut items = IndexMap::new();
        for _ in 0..n {
            let name = self.name()?;
            let data = self.data()?;
            items.insert(name, data);
        }
        Ok(items)
    }

    fn group(&mut self) -> Result<Group> {
        let attributes = self.items()?;
        let datasets = self.items()?;
        let n = self.u32()?;
        let mut groups = IndexMap::new();
        for _ in 0..n {
            let name = self.name()?;
            let group = self.group()?;
            groups.insert(name, group);
        }
        Ok(Group {
            attributes,
            datasets,
            groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Group {
        let mut root = Group::new();
        root.set_attribute("Version", Data::F64(vec![2.0]));
        root.set_attribute("channelDataFor", Data::I16(vec![1, 3]));
        let chan = root.group_mut("chan_1");
        chan.set_attribute("isLinkListData", Data::I16(vec![1]));
        chan.add_dataset("waveformLib", Data::I16(vec![0, 0, 0, 0, 8191, -8191]));
        chan.group_mut("linkListData")
            .group_mut("bank1")
            .add_dataset("offset", Data::U16(vec![0xF000, 3]));
        root
    }

    #[test]
    fn test_read_back() {
        let root = sample_tree();
        let bytes = root.to_bytes();
        assert_eq!(&bytes[..4], b"AWGC");
        let parsed = Group::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, root);
        let bank = parsed
            .group("chan_1")
            .unwrap()
            .group("linkListData")
            .unwrap()
            .group("bank1")
            .unwrap();
        assert_eq!(
            bank.dataset("offset").unwrap().as_u16().unwrap(),
            &[0xF000, 3]
        );
        assert!(parsed.group("chan_9").is_err());
        assert!(parsed.attribute("Version").unwrap().as_i16().is_none());
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut a = Group::new();
        a.set_attribute("b", Data::I16(vec![1]));
        a.set_attribute("a", Data::I16(vec![2]));
        let parsed = Group::from_bytes(&a.to_bytes()).unwrap();
        let names: Vec<_> = parsed.attributes.keys().cloned().collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_malformed_input() {
        let bytes = sample_tree().to_bytes();
        assert!(Group::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(Group::from_bytes(b"HDF5\x01\x00").is_err());
        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(Group::from_bytes(&trailing).is_err());
        let mut bad_version = bytes;
        bad_version[4] = 9;
        assert!(Group::from_bytes(&bad_version).is_err());
    }
}
