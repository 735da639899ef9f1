use super::SimError;
use super::store::{Shadow, Store};
use crate::prim::{Graph, NodeId, PrimKind, Selection, select};
use crate::value::Value;

/// One concrete place an lvalue may refer to.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Location {
    storage: NodeId,
    path: Vec<usize>,
    /// Bit window inside a scalar element.
    lo: usize,
    len: usize,
    /// The location is only one of several candidates, so the write merges
    /// with the previous value instead of replacing it.
    uncertain: bool,
}

/// Storage lookup over the live values.
pub(crate) fn lookup<'s>(store: &'s Store) -> impl Fn(NodeId) -> Option<&'s Value> + 's {
    move |id| store.get(id)
}

/// Writes `value` through `lvalue` into `shadow`. Index operands are read
/// from the live `store`. With `uncertain` set every write merges with the
/// previous contents.
pub(crate) fn poke(
    graph: &Graph,
    store: &Store,
    shadow: &mut Shadow,
    lvalue: NodeId,
    value: &Value,
    uncertain: bool,
) -> Result<(), SimError> {
    if let PrimKind::Concat(parts) = &graph.node(lvalue).kind {
        let bits = value.as_bits().resize(graph.width(lvalue));
        let mut offset = 0;
        for &part in parts.iter().rev() {
            let width = graph.width(part);
            let piece = Value::Bits(bits.slice(offset, width));
            poke(graph, store, shadow, part, &piece, uncertain)?;
            offset += width;
        }
        return Ok(());
    }
    let mut locations = Vec::new();
    resolve(graph, store, lvalue, uncertain, &mut locations)?;
    for location in locations {
        write(graph, store, shadow, &location, value);
    }
    Ok(())
}

fn candidates(selection: Selection, len: usize) -> (Vec<usize>, bool) {
    match selection {
        Selection::One(i) => (vec![i], false),
        Selection::Some(positions) => (positions, true),
        Selection::OutOfRange => (Vec::new(), false),
        // Any slot might be hit, so every slot becomes uncertain.
        Selection::Anywhere => ((0..len).collect(), true),
    }
}

fn resolve(
    graph: &Graph,
    store: &Store,
    lvalue: NodeId,
    uncertain: bool,
    out: &mut Vec<Location>,
) -> Result<(), SimError> {
    let node = graph.node(lvalue);
    match &node.kind {
        PrimKind::Storage(_) => out.push(Location {
            storage: lvalue,
            path: Vec::new(),
            lo: 0,
            len: node.width,
            uncertain,
        }),
        PrimKind::Register { storage, .. } => resolve(graph, store, *storage, uncertain, out)?,
        PrimKind::Slice { base, start, len } => {
            let mut inner = Vec::new();
            resolve(graph, store, *base, uncertain, &mut inner)?;
            out.extend(inner.into_iter().map(|mut loc| {
                loc.lo += start;
                loc.len = *len;
                loc
            }));
        }
        PrimKind::BitIndex { base, index } => {
            let index = graph.eval_bits(*index, &lookup(store))?;
            let width = graph.width(*base);
            let (positions, several) = candidates(select(&index, width), width);
            let mut inner = Vec::new();
            resolve(graph, store, *base, uncertain || several, &mut inner)?;
            for loc in inner {
                out.extend(positions.iter().map(|&i| Location {
                    lo: loc.lo + i,
                    len: 1,
                    ..loc.clone()
                }));
            }
        }
        PrimKind::Index { base, index } => {
            let index = graph.eval_bits(*index, &lookup(store))?;
            let len = graph.dims(*base)[0];
            let (positions, several) = candidates(select(&index, len), len);
            let mut inner = Vec::new();
            resolve(graph, store, *base, uncertain || several, &mut inner)?;
            for loc in inner {
                out.extend(positions.iter().map(|&i| {
                    let mut path = loc.path.clone();
                    path.push(i);
                    Location {
                        path,
                        ..loc.clone()
                    }
                }));
            }
        }
        PrimKind::Mux { select: sel, ports } => {
            let choice = graph.eval_bits(*sel, &lookup(store))?;
            let (positions, several) = candidates(select(&choice, ports.len()), ports.len());
            for i in positions {
                resolve(graph, store, ports[i], uncertain || several, out)?;
            }
        }
        _ => panic!("{} is not assignable", graph.display(lvalue)),
    }
    Ok(())
}

fn write(graph: &Graph, store: &Store, shadow: &mut Shadow, location: &Location, value: &Value) {
    let previous = shadow.read(store, location.storage, &location.path);
    let next = match &previous {
        Value::Bits(bits) => {
            let incoming = value.as_bits().resize(location.len);
            let spliced = bits.splice(location.lo, &incoming);
            Value::Bits(spliced)
        }
        Value::Array(_) => {
            let width = graph.width(location.storage);
            value.resize(width)
        }
    };
    let next = if location.uncertain {
        previous.combine(&next)
    } else {
        next
    };
    shadow.write(location.storage, location.path.clone(), next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prim::{StorageInfo, StorageKind};

    fn bits(s: &str) -> Value {
        Value::Bits(s.parse().unwrap())
    }

    struct Fixture {
        graph: Graph,
        store: Store,
        mem: NodeId,
        idx: NodeId,
    }

    fn fixture(index: &str) -> Fixture {
        let mut graph = Graph::new();
        let mem = graph.declare(StorageInfo::new("mem", None, StorageKind::Reg, 4).with_dims([3]));
        let idx = graph.declare(StorageInfo::new("idx", None, StorageKind::Wire, 2));
        let mut store = Store::default();
        store.reset(&graph);
        store.write(
            mem,
            &[],
            Value::Array(vec![bits("0000"), bits("0000"), bits("0000")]),
        );
        store.write(idx, &[], bits(index));
        Fixture {
            graph,
            store,
            mem,
            idx,
        }
    }

    fn poke_element(f: &mut Fixture, value: &str) -> Value {
        let target = f.graph.index(f.mem, f.idx);
        let mut shadow = Shadow::default();
        poke(&f.graph, &f.store, &mut shadow, target, &bits(value), false).unwrap();
        shadow.commit(&mut f.store);
        f.store.get(f.mem).unwrap().clone()
    }

    #[test]
    fn test_defined_index_writes_one_element() {
        let mut f = fixture("01");
        let after = poke_element(&mut f, "1111");
        assert_eq!(after, Value::Array(vec![bits("0000"), bits("1111"), bits("0000")]));
    }

    #[test]
    fn test_out_of_range_index_is_ignored() {
        let mut f = fixture("11");
        let after = poke_element(&mut f, "1111");
        assert_eq!(after, Value::Array(vec![bits("0000"), bits("0000"), bits("0000")]));
    }

    #[test]
    fn test_unknown_index_merges_into_candidates() {
        let mut f = fixture("0x");
        let after = poke_element(&mut f, "0101");
        assert_eq!(after, Value::Array(vec![bits("0x0x"), bits("0x0x"), bits("0000")]));
    }

    #[test]
    fn test_possibly_out_of_range_index_broadcasts() {
        let mut f = fixture("1x");
        let after = poke_element(&mut f, "0001");
        assert_eq!(after, Value::Array(vec![bits("000x"), bits("000x"), bits("000x")]));
    }

    #[test]
    fn test_slice_of_bit_window() {
        let mut graph = Graph::new();
        let r = graph.declare(StorageInfo::new("r", None, StorageKind::Reg, 8));
        let mut store = Store::default();
        store.reset(&graph);
        store.write(r, &[], bits("00000000"));
        let window = graph.slice(r, 2, 3);
        let mut shadow = Shadow::default();
        poke(&graph, &store, &mut shadow, window, &bits("111"), false).unwrap();
        shadow.commit(&mut store);
        assert_eq!(store.get(r), Some(&bits("00011100")));
    }
}
