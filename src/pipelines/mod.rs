pub mod metagenome_assembly;
