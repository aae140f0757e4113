use super::ClaimTrieCache;
use crate::queue::{Record, RecordKind};
use crate::{Error, Result};
use claimtrie_primitives::{Claim, ClaimId, OutPoint, Support};

fn validate(name: &[u8], amount: i64) -> Result<()> {
    if name.is_empty() {
        return Err(Error::MalformedInput("empty name".to_string()));
    }
    if amount < 0 {
        return Err(Error::MalformedInput(format!("negative amount {amount}")));
    }
    Ok(())
}

fn validate_name(name: &[u8]) -> Result<()> {
    if name.is_empty() {
        return Err(Error::MalformedInput("empty name".to_string()));
    }
    Ok(())
}

impl ClaimTrieCache {
    /// Adds a claim created at `height`.
    ///
    /// The valid height is `valid_height_hint` when given, otherwise `height` plus
    /// the takeover delay of the name. The claim enters the trie at once if it is
    /// already valid, or valid at the open height without delay; otherwise it
    /// waits in the pending queue.
    pub fn add_claim(
        &mut self,
        name: &[u8],
        outpoint: OutPoint,
        claim_id: ClaimId,
        amount: i64,
        height: u32,
        valid_height_hint: Option<u32>,
    ) -> Result<()> {
        validate(name, amount)?;
        let valid_height = valid_height_hint
            .unwrap_or_else(|| height.saturating_add(self.delay_for(name, &claim_id, height)));
        tracing::trace!(
            "Adding claim {claim_id} on {} at {outpoint}: amount {amount}, height {height}, valid height {valid_height}",
            hex::encode(name)
        );
        let uncontested = self.is_uncontested(name, &claim_id);
        let record = Record::Claim(Claim::new(outpoint, claim_id, amount, height, valid_height));
        self.add_record(name, record, uncontested);
        Ok(())
    }

    /// Adds a support for `supported_claim_id`, activated like a claim.
    pub fn add_support(
        &mut self,
        name: &[u8],
        outpoint: OutPoint,
        supported_claim_id: ClaimId,
        amount: i64,
        height: u32,
        valid_height_hint: Option<u32>,
    ) -> Result<()> {
        validate(name, amount)?;
        let valid_height = valid_height_hint.unwrap_or_else(|| {
            height.saturating_add(self.delay_for(name, &supported_claim_id, height))
        });
        tracing::trace!(
            "Adding support for {supported_claim_id} on {} at {outpoint}: amount {amount}, height {height}, valid height {valid_height}",
            hex::encode(name)
        );
        let uncontested = self.is_uncontested(name, &supported_claim_id);
        let record = Record::Support(Support::new(
            outpoint,
            supported_claim_id,
            amount,
            height,
            valid_height,
        ));
        self.add_record(name, record, uncontested);
        Ok(())
    }

    /// Spends a claim, pending or active.
    ///
    /// Returns the removed claim, whose valid height the caller keeps to undo
    /// the spend, or `None` if nothing matched.
    pub fn spend_claim(&mut self, name: &[u8], outpoint: &OutPoint) -> Result<Option<Claim>> {
        validate_name(name)?;
        let removed = self.remove_record(name, RecordKind::Claim, outpoint);
        tracing::trace!(
            "Spending claim {outpoint} on {}: {}",
            hex::encode(name),
            if removed.is_some() { "removed" } else { "not found" }
        );
        Ok(removed.and_then(|record| match record {
            Record::Claim(claim) => Some(claim),
            Record::Support(_) => None,
        }))
    }

    /// Spends a support, pending or active.
    pub fn spend_support(&mut self, name: &[u8], outpoint: &OutPoint) -> Result<Option<Support>> {
        validate_name(name)?;
        let removed = self.remove_record(name, RecordKind::Support, outpoint);
        tracing::trace!(
            "Spending support {outpoint} on {}: {}",
            hex::encode(name),
            if removed.is_some() { "removed" } else { "not found" }
        );
        Ok(removed.and_then(|record| match record {
            Record::Support(support) => Some(support),
            Record::Claim(_) => None,
        }))
    }

    /// Removes a claim added by the block being disconnected.
    pub fn undo_add_claim(&mut self, name: &[u8], outpoint: &OutPoint) -> Result<bool> {
        validate_name(name)?;
        let removed = self.remove_record(name, RecordKind::Claim, outpoint);
        tracing::trace!("Undo add claim {outpoint} on {}", hex::encode(name));
        Ok(removed.is_some())
    }

    /// Removes a support added by the block being disconnected.
    pub fn undo_add_support(&mut self, name: &[u8], outpoint: &OutPoint) -> Result<bool> {
        validate_name(name)?;
        let removed = self.remove_record(name, RecordKind::Support, outpoint);
        tracing::trace!("Undo add support {outpoint} on {}", hex::encode(name));
        Ok(removed.is_some())
    }

    /// Restores a claim spent by the block being disconnected with its original
    /// valid height.
    pub fn undo_spend_claim(
        &mut self,
        name: &[u8],
        outpoint: OutPoint,
        claim_id: ClaimId,
        amount: i64,
        height: u32,
        valid_height: u32,
    ) -> Result<()> {
        validate(name, amount)?;
        tracing::trace!(
            "Undo spend claim {claim_id} on {} at {outpoint}, valid height {valid_height}",
            hex::encode(name)
        );
        let record = Record::Claim(Claim::new(outpoint, claim_id, amount, height, valid_height));
        self.add_record(name, record, false);
        Ok(())
    }

    /// Restores a support spent by the block being disconnected.
    pub fn undo_spend_support(
        &mut self,
        name: &[u8],
        outpoint: OutPoint,
        supported_claim_id: ClaimId,
        amount: i64,
        height: u32,
        valid_height: u32,
    ) -> Result<()> {
        validate(name, amount)?;
        tracing::trace!(
            "Undo spend support for {supported_claim_id} on {} at {outpoint}, valid height {valid_height}",
            hex::encode(name)
        );
        let record = Record::Support(Support::new(
            outpoint,
            supported_claim_id,
            amount,
            height,
            valid_height,
        ));
        self.add_record(name, record, false);
        Ok(())
    }

    /// Activates `record` at once if it is valid before the open height, or at
    /// the open height on an `uncontested` name, and queues it otherwise.
    fn add_record(&mut self, name: &[u8], record: Record, uncontested: bool) {
        let valid_height = record.valid_height();
        self.schedule_expiration(name, &record);
        self.index_claim(name, &record);
        if valid_height < self.next_height || (valid_height == self.next_height && uncontested) {
            self.touch(name);
            self.insert_active(name, record);
        } else {
            self.pending.push(name, record);
        }
    }

    /// Cancels a pending record, or removes an active one.
    fn remove_record(&mut self, name: &[u8], kind: RecordKind, outpoint: &OutPoint) -> Option<Record> {
        let record = match self.pending.remove(name, kind, outpoint) {
            Some(record) => record,
            None => {
                let active = match kind {
                    RecordKind::Claim => self.have_claim(name, outpoint),
                    RecordKind::Support => self.have_support(name, outpoint),
                };
                if !active {
                    return None;
                }
                self.touch(name);
                self.remove_active(name, kind, outpoint)?
            }
        };
        self.unschedule_expiration(name, &record);
        self.unindex_claim(name, &record);
        Some(record)
    }
}
