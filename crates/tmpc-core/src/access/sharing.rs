//! Secret sharing over an access tree
//!
//! AND splits additively, OR duplicates, THRESHOLD(k) evaluates a random
//! polynomial of degree `k-1` at `x = 1, 2, ...` in child order. Public data
//! holds `a·G` for the value `a` assigned to every node, keyed by node name
//! (the root under the empty name).

use super::{AccessStructure, NodeId, NodeKind};
use crate::curve::{Point, Scalar};
use crate::{Error, Result};
use rand_core::{CryptoRng, RngCore};
use std::collections::{BTreeMap, BTreeSet};

/// Share value per leaf name
pub type LeafShares = BTreeMap<String, Scalar>;

/// Public point per node name
pub type PublicData = BTreeMap<String, Point>;

/// Lagrange basis polynomial `i` over points `xs`, evaluated at `x`
pub fn lagrange_at(x: &Scalar, xs: &[Scalar], i: usize) -> Result<Scalar> {
    let xi = xs
        .get(i)
        .ok_or_else(|| Error::invalid_argument("lagrange", "index out of range"))?;
    let mut num = Scalar::one(xi.curve());
    let mut den = Scalar::one(xi.curve());
    for (j, xj) in xs.iter().enumerate() {
        if j == i {
            continue;
        }
        num = num.mul(&x.sub(xj)?)?;
        den = den.mul(&xi.sub(xj)?)?;
    }
    if den.is_zero() {
        return Err(Error::invalid_argument("lagrange", "repeated x-coordinate"));
    }
    num.div(&den)
}

/// Lagrange coefficient for reconstructing `f(0)`
pub fn lagrange_at_zero(xs: &[Scalar], i: usize) -> Result<Scalar> {
    let curve = xs
        .first()
        .ok_or_else(|| Error::invalid_argument("lagrange", "no points"))?
        .curve();
    lagrange_at(&Scalar::zero(curve), xs, i)
}

impl AccessStructure {
    /// x-coordinate of the child at `position` under a THRESHOLD node
    pub(crate) fn child_x(&self, position: usize) -> Scalar {
        Scalar::from_u64(self.curve, position as u64 + 1)
    }

    /// Split `secret` into per-leaf shares
    pub fn share<R: RngCore + CryptoRng>(&self, secret: &Scalar, rng: &mut R) -> Result<LeafShares> {
        let mut leaves = LeafShares::new();
        self.share_node(self.root(), *secret, rng, &mut leaves, None)?;
        Ok(leaves)
    }

    /// Split `secret` and also return the public point of every node
    pub fn share_with_public<R: RngCore + CryptoRng>(
        &self,
        secret: &Scalar,
        rng: &mut R,
    ) -> Result<(LeafShares, PublicData)> {
        let mut leaves = LeafShares::new();
        let mut public = PublicData::new();
        self.share_node(self.root(), *secret, rng, &mut leaves, Some(&mut public))?;
        Ok((leaves, public))
    }

    fn share_node<R: RngCore + CryptoRng>(
        &self,
        id: NodeId,
        a: Scalar,
        rng: &mut R,
        leaves: &mut LeafShares,
        mut public: Option<&mut PublicData>,
    ) -> Result<()> {
        if a.curve() != self.curve {
            return Err(Error::invalid_argument("access", "secret from another curve"));
        }
        let node = self.node(id);
        if let Some(public) = public.as_deref_mut() {
            public.insert(node.name.clone(), self.curve.mul_generator(&a)?);
        }

        match node.kind {
            NodeKind::Leaf => {
                leaves.insert(node.name.clone(), a);
            }
            NodeKind::Or => {
                for &c in &node.children {
                    self.share_node(c, a, rng, leaves, public.as_deref_mut())?;
                }
            }
            NodeKind::And => {
                let mut rest = a;
                let last = node.children.len() - 1;
                for (pos, &c) in node.children.iter().enumerate() {
                    let part = if pos == last {
                        rest
                    } else {
                        let r = Scalar::random(self.curve, rng);
                        rest = rest.sub(&r)?;
                        r
                    };
                    self.share_node(c, part, rng, leaves, public.as_deref_mut())?;
                }
            }
            NodeKind::Threshold => {
                let mut coeffs = vec![a];
                coeffs.extend((1..node.k).map(|_| Scalar::random(self.curve, rng)));
                for (pos, &c) in node.children.iter().enumerate() {
                    let x = self.child_x(pos);
                    // Horner
                    let mut y = Scalar::zero(self.curve);
                    for coeff in coeffs.iter().rev() {
                        y = y.mul(&x)?.add(coeff)?;
                    }
                    self.share_node(c, y, rng, leaves, public.as_deref_mut())?;
                }
            }
        }
        Ok(())
    }

    fn public_of<'a>(&self, id: NodeId, public: &'a PublicData) -> Result<&'a Point> {
        let name = &self.node(id).name;
        let p = public
            .get(name)
            .ok_or_else(|| Error::crypto("access", format!("missing public data for {:?}", name)))?;
        if p.curve() != self.curve {
            return Err(Error::crypto("access", "public data on another curve"));
        }
        Ok(p)
    }

    /// Check one internal node against its children's public points
    fn check_node(&self, id: NodeId, public: &PublicData) -> Result<()> {
        let node = self.node(id);
        let mine = self.public_of(id, public)?;
        let children = node
            .children
            .iter()
            .map(|&c| self.public_of(c, public))
            .collect::<Result<Vec<_>>>()?;

        let consistent = match node.kind {
            NodeKind::Leaf => true,
            NodeKind::Or => children.iter().all(|p| *p == mine),
            NodeKind::And => crate::curve::sum_points(self.curve, children.iter().copied())? == *mine,
            NodeKind::Threshold => {
                let xs: Vec<Scalar> = (0..node.k).map(|pos| self.child_x(pos)).collect();
                let base = &children[..node.k];
                let interpolate = |x: &Scalar| -> Result<Point> {
                    let mut acc = self.curve.identity();
                    for (i, p) in base.iter().enumerate() {
                        acc = acc.add(&p.mul(&lagrange_at(x, &xs, i)?)?)?;
                    }
                    Ok(acc)
                };
                let mut ok = interpolate(&Scalar::zero(self.curve))? == *mine;
                for (pos, p) in children.iter().enumerate().skip(node.k) {
                    ok &= interpolate(&self.child_x(pos))? == **p;
                }
                ok
            }
        };
        if !consistent {
            return Err(Error::crypto(
                "access",
                format!("public data inconsistent at node {:?}", node.name),
            ));
        }
        Ok(())
    }

    /// Check that public data is a valid sharing of `q` over the whole tree
    pub fn verify_public_data(&self, q: &Point, public: &PublicData) -> Result<()> {
        if self.public_of(self.root(), public)? != q {
            return Err(Error::crypto("access", "root public data does not match key"));
        }
        for id in 0..self.nodes.len() {
            self.check_node(id, public)?;
        }
        Ok(())
    }

    /// Check a leaf share against the public data on its path to the root
    pub fn verify_share(
        &self,
        q: &Point,
        leaf: &str,
        share: &Scalar,
        public: &PublicData,
    ) -> Result<()> {
        let id = self
            .find_leaf(leaf)
            .ok_or_else(|| Error::invalid_argument("access", format!("unknown leaf {}", leaf)))?;
        if self.curve.mul_generator(share)? != *self.public_of(id, public)? {
            return Err(Error::crypto("access", "share does not match its public point"));
        }
        let mut cur = self.parent(id);
        while let Some(node) = cur {
            self.check_node(node, public)?;
            cur = self.parent(node);
        }
        if self.public_of(self.root(), public)? != q {
            return Err(Error::crypto("access", "root public data does not match key"));
        }
        Ok(())
    }

    /// Weights `c_l` with `Σ c_l·share_l = secret` for a satisfying quorum
    ///
    /// OR nodes use their first satisfied child, AND nodes all children and
    /// THRESHOLD nodes interpolate over every satisfied child. Quorum leaves
    /// that are not needed get weight zero.
    pub fn additive_coefficients<S: AsRef<str>>(
        &self,
        quorum: &[S],
    ) -> Result<BTreeMap<String, Scalar>> {
        let set: BTreeSet<&str> = quorum.iter().map(|s| s.as_ref()).collect();
        if let Some(unknown) = set.iter().find(|n| !self.has_leaf(n)) {
            return Err(Error::invalid_argument(
                "access",
                format!("{} is not a leaf", unknown),
            ));
        }
        if !self.satisfied(self.root(), &set) {
            return Err(Error::invalid_argument(
                "access",
                "quorum does not satisfy the access structure",
            ));
        }
        let mut out: BTreeMap<String, Scalar> = set
            .iter()
            .map(|n| (n.to_string(), Scalar::zero(self.curve)))
            .collect();
        self.coefficients_node(self.root(), Scalar::one(self.curve), &set, &mut out)?;
        Ok(out)
    }

    fn coefficients_node(
        &self,
        id: NodeId,
        coef: Scalar,
        set: &BTreeSet<&str>,
        out: &mut BTreeMap<String, Scalar>,
    ) -> Result<()> {
        let node = self.node(id);
        match node.kind {
            NodeKind::Leaf => {
                let slot = out
                    .get_mut(&node.name)
                    .ok_or_else(|| Error::fatal("access", "leaf outside quorum selected"))?;
                *slot = slot.add(&coef)?;
            }
            NodeKind::And => {
                for &c in &node.children {
                    self.coefficients_node(c, coef, set, out)?;
                }
            }
            NodeKind::Or => {
                let chosen = node
                    .children
                    .iter()
                    .copied()
                    .find(|&c| self.satisfied(c, set))
                    .ok_or_else(|| Error::fatal("access", "unsatisfied OR node"))?;
                self.coefficients_node(chosen, coef, set, out)?;
            }
            NodeKind::Threshold => {
                let chosen: Vec<(usize, NodeId)> = node
                    .children
                    .iter()
                    .copied()
                    .enumerate()
                    .filter(|&(_, c)| self.satisfied(c, set))
                    .collect();
                if chosen.len() < node.k {
                    return Err(Error::fatal("access", "unsatisfied THRESHOLD node"));
                }
                let xs: Vec<Scalar> = chosen.iter().map(|&(pos, _)| self.child_x(pos)).collect();
                for (i, &(_, c)) in chosen.iter().enumerate() {
                    let lambda = lagrange_at_zero(&xs, i)?;
                    self.coefficients_node(c, coef.mul(&lambda)?, set, out)?;
                }
            }
        }
        Ok(())
    }

    /// Recover the secret from the shares of a satisfying set of leaves
    pub fn reconstruct(&self, shares: &LeafShares) -> Result<Scalar> {
        let names: Vec<&str> = shares.keys().map(String::as_str).collect();
        let coeffs = self.additive_coefficients(&names)?;
        let mut secret = Scalar::zero(self.curve);
        for (name, c) in &coeffs {
            secret = secret.add(&c.mul(&shares[name])?)?;
        }
        Ok(secret)
    }

    /// Reconstruction in the exponent
    pub fn reconstruct_point(&self, shares: &BTreeMap<String, Point>) -> Result<Point> {
        let names: Vec<&str> = shares.keys().map(String::as_str).collect();
        let coeffs = self.additive_coefficients(&names)?;
        let mut acc = self.curve.identity();
        for (name, c) in &coeffs {
            acc = acc.add(&shares[name].mul(c)?)?;
        }
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{and, leaf, threshold, AccessNode};
    use super::*;
    use crate::curve::Curve;
    use rand::rngs::OsRng;

    fn backup_tree(curve: Curve) -> AccessStructure {
        let root = and(vec![
            leaf("leaf1"),
            AccessNode::threshold("th", 2, vec![leaf("leaf2"), leaf("leaf3"), leaf("leaf4")]),
        ]);
        AccessStructure::new(curve, &root).unwrap()
    }

    fn subset(shares: &LeafShares, names: &[&str]) -> LeafShares {
        names
            .iter()
            .map(|n| (n.to_string(), shares[*n]))
            .collect()
    }

    #[test]
    fn test_reconstruct_independent_of_quorum() {
        for curve in Curve::ALL {
            let ac = backup_tree(curve);
            let secret = curve.random_scalar(&mut OsRng);
            let shares = ac.share(&secret, &mut OsRng).unwrap();
            assert_eq!(shares.len(), 4);

            for quorum in [
                &["leaf1", "leaf2", "leaf3"][..],
                &["leaf1", "leaf3", "leaf4"][..],
                &["leaf1", "leaf2", "leaf4"][..],
                &["leaf1", "leaf2", "leaf3", "leaf4"][..],
            ] {
                assert_eq!(ac.reconstruct(&subset(&shares, quorum)).unwrap(), secret);
            }
            assert!(ac.reconstruct(&subset(&shares, &["leaf2", "leaf3", "leaf4"])).is_err());
            assert!(ac.reconstruct(&subset(&shares, &["leaf1", "leaf4"])).is_err());
        }
    }

    #[test]
    fn test_public_data_and_share_verification() {
        let curve = Curve::Secp256k1;
        let ac = backup_tree(curve);
        let secret = curve.random_scalar(&mut OsRng);
        let q = curve.mul_generator(&secret).unwrap();
        let (shares, public) = ac.share_with_public(&secret, &mut OsRng).unwrap();

        ac.verify_public_data(&q, &public).unwrap();
        for (name, s) in &shares {
            ac.verify_share(&q, name, s, &public).unwrap();
        }

        let wrong = shares["leaf3"].add(&Scalar::one(curve)).unwrap();
        assert!(ac.verify_share(&q, "leaf3", &wrong, &public).is_err());

        let mut tampered = public.clone();
        tampered.insert("leaf4".into(), curve.generator());
        assert!(ac.verify_public_data(&q, &tampered).is_err());
        // leaf1's path never touches leaf4
        ac.verify_share(&q, "leaf1", &shares["leaf1"], &tampered).unwrap();
        assert!(ac.verify_share(&q, "leaf2", &shares["leaf2"], &tampered).is_err());
    }

    #[test]
    fn test_coefficients_in_exponent() {
        let curve = Curve::P256;
        let ac = AccessStructure::new(
            curve,
            &threshold(2, vec![leaf("party_0"), leaf("party_1"), leaf("party_2")]),
        )
        .unwrap();
        let secret = curve.random_scalar(&mut OsRng);
        let q = curve.mul_generator(&secret).unwrap();
        let (_, public) = ac.share_with_public(&secret, &mut OsRng).unwrap();

        let pubs: BTreeMap<String, Point> = ["party_0", "party_2"]
            .iter()
            .map(|n| (n.to_string(), public[*n]))
            .collect();
        assert_eq!(ac.reconstruct_point(&pubs).unwrap(), q);

        let coeffs = ac.additive_coefficients(&["party_1", "party_2"]).unwrap();
        assert_eq!(coeffs.len(), 2);
        assert!(ac.additive_coefficients(&["party_1"]).is_err());
        assert!(ac.additive_coefficients(&["party_1", "stranger"]).is_err());
    }

    #[test]
    fn test_lagrange() {
        let curve = Curve::Ed25519;
        let xs: Vec<Scalar> = (1..=3).map(|i| Scalar::from_u64(curve, i)).collect();
        // f(x) = 5 + 2x + 3x^2
        let f = |x: u64| Scalar::from_u64(curve, 5 + 2 * x + 3 * x * x);
        let mut acc = Scalar::zero(curve);
        for i in 0..3 {
            acc = acc
                .add(&f(i as u64 + 1).mul(&lagrange_at_zero(&xs, i).unwrap()).unwrap())
                .unwrap();
        }
        assert_eq!(acc, Scalar::from_u64(curve, 5));

        let dup = vec![xs[0], xs[0]];
        assert!(lagrange_at_zero(&dup, 0).is_err());
    }
}
